use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

/// Default pause after every successful backend call.
pub const DEFAULT_BACKEND_DELAY_SECS: f64 = 0.02;

/// Which remote caching-fetch API a backend speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Supports `softCrawl`; searched by query only.
    #[default]
    Primary,
    /// Cache lookups by query or by exact URL, oldest-first on request.
    Secondary,
}
impl BackendKind {
    pub fn default_timeout_secs(self) -> u64 {
        match self {
            Self::Primary => 90,
            Self::Secondary => 30,
        }
    }
}

/// One entry of the ordered backend chain, most preferred first.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Used in logs and for duplicate detection.
    pub name: String,
    #[serde(default)]
    pub kind: BackendKind,
    /// Endpoint paths (`v0/cache`, ...) are resolved against this URL.
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Overall budget for one call, 429 retries included.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub delay_secs: Option<f64>,
}
impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        // A zero budget would never allow a single request.
        Duration::from_secs(self.timeout_secs.unwrap_or(self.kind.default_timeout_secs()).max(1))
    }

    pub fn delay_secs(&self) -> f64 {
        self.delay_secs.unwrap_or(DEFAULT_BACKEND_DELAY_SECS)
    }
}
impl Debug for BackendConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("delay_secs", &self.delay_secs)
            .finish()
    }
}
