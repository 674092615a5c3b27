use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Browser identity presented by the direct fetcher.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.93 Safari/537.36";
/// Where undecodable response bodies are written for inspection.
pub const DEFAULT_DECODE_FAILURE_DUMP: &str = "/tmp/hermes_decodeFailure.html";

/// A cookie sent with every direct request to matching URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieConfig {
    pub name: String,
    pub value: String,
    /// A leading `.` also matches subdomains.
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
}
impl CookieConfig {
    pub fn new(name: &str, value: &str, domain: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
        }
    }
}

fn root_path() -> String {
    "/".to_string()
}

/// Age and terms-of-service gates that would otherwise hide content.
pub fn default_cookies() -> Vec<CookieConfig> {
    vec![
        CookieConfig::new("fauser", "wizard", "www.fictionalley.org", "/authors"),
        CookieConfig::new("adult_explicit", "1", ".livejournal.com", "/"),
        CookieConfig::new("accepted_tos", "20180523", "archiveofourown.org", "/"),
    ]
}

/// Live HTTP fetching, and the per-call defaults used by every fetch mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Politeness hint for the randomized pause after each request.
    pub delay_secs: f64,
    /// Fall back to a direct fetch when every backend failed.
    pub fallback: bool,
    /// `None` disables the dump.
    pub decode_failure_dump: Option<PathBuf>,
    pub cookies: Vec<CookieConfig>,
}
impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 15,
            delay_secs: 3.0,
            fallback: false,
            decode_failure_dump: Some(PathBuf::from(DEFAULT_DECODE_FAILURE_DUMP)),
            cookies: default_cookies(),
        }
    }
}
impl DirectConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
