//! Layered configuration for hermes.
//!
//! Values are merged, last one wins, from:
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A TOML file: an explicit path, or `config.toml` in the platform config
//!    directory when it exists.
//! 3. `HERMES_*` environment variables, with `__` separating nested keys
//!    (`HERMES_DIRECT__TIMEOUT_SECS=30`).
//! 4. The legacy switches `HERMES_STALE`, `HERMES_STALE_BEFORE`,
//!    `HERMES_SCRAPE_SOURCE` and `OIL_SCRAPE_SOURCE`.

mod backend;
mod direct;
pub mod error;

pub use crate::backend::{BackendConfig, BackendKind, DEFAULT_BACKEND_DELAY_SECS};
pub use crate::direct::{
    CookieConfig, DEFAULT_DECODE_FAILURE_DUMP, DEFAULT_USER_AGENT, DirectConfig, default_cookies,
};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hermes_canon::{Canonicalizer, DEFAULT_PRESERVE_TRAILING_SLASH};
use hermes_compress::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "HERMES_";
const ENV_STALE: &str = "HERMES_STALE";
const ENV_STALE_BEFORE: &str = "HERMES_STALE_BEFORE";
const ENV_SCRAPE_SOURCE: &str = "HERMES_SCRAPE_SOURCE";
const ENV_LEGACY_SCRAPE_SOURCE: &str = "OIL_SCRAPE_SOURCE";

/// Replay settings: when enabled, no fetch touches the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaleConfig {
    pub enabled: bool,
    /// Ignore every record with a higher ID.
    pub before_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonConfig {
    /// Domains (and their subdomains) on which a trailing slash is kept.
    pub preserve_trailing_slash: Vec<String>,
}
impl Default for CanonConfig {
    fn default() -> Self {
        Self {
            preserve_trailing_slash: DEFAULT_PRESERVE_TRAILING_SLASH.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding the fetch log.
    pub database: PathBuf,
    /// Tag stamped on every record this process appends.
    pub source: Option<String>,
    pub stale: StaleConfig,
    /// Codec for newly appended bodies.
    pub compression: Compression,
    pub canon: CanonConfig,
    pub direct: DirectConfig,
    /// Remote caching-fetch services, most preferred first.
    pub backends: Vec<BackendConfig>,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            source: None,
            stale: StaleConfig::default(),
            compression: Compression::default(),
            canon: CanonConfig::default(),
            direct: DirectConfig::default(),
            backends: Vec::new(),
        }
    }
}

impl Config {
    /// Load, merge and validate the configuration.
    ///
    /// An explicit `path` must exist; the platform default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = figment.merge(Toml::file(path));
            },
            None => {
                if let Some(path) = default_config_path() {
                    tracing::debug!(path = %path.display(), "Looking for default configuration file");
                    figment = figment.merge(Toml::file(path));
                }
            },
        }
        let figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                // Legacy switches don't fit the nested layout; they're applied below.
                .ignore(&["STALE", "STALE_BEFORE", "SCRAPE_SOURCE"])
                .split("__"),
        );
        let mut config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.apply_legacy_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_legacy_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if var(ENV_STALE).is_some() {
            self.stale.enabled = true;
        }
        if let Some(before) = var(ENV_STALE_BEFORE) {
            let before = before.trim().parse::<i64>().or_raise(|| ErrorKind::InvalidEnv(ENV_STALE_BEFORE))?;
            self.stale.before_id = Some(before);
            self.stale.enabled = true;
        }
        if let Some(source) = var(ENV_SCRAPE_SOURCE).or_else(|| var(ENV_LEGACY_SCRAPE_SOURCE)) {
            self.source = Some(source);
        }
        Ok(())
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if !self.compression.is_self_describing() {
            errors.push(format!("compression `{}` can't be detected when reading bodies back", self.compression));
        }
        if !self.direct.delay_secs.is_finite() || self.direct.delay_secs < 0.0 {
            errors.push("direct.delay_secs must be a non-negative number".to_string());
        }
        if self.direct.user_agent.trim().is_empty() {
            errors.push("direct.user_agent must not be empty".to_string());
        }
        for cookie in &self.direct.cookies {
            if cookie.name.is_empty() || cookie.domain.trim_start_matches('.').is_empty() {
                errors.push(format!("cookie `{}` needs a name and a domain", cookie.name));
            }
        }
        let mut names = HashSet::new();
        for backend in &self.backends {
            if backend.name.is_empty() {
                errors.push(format!("backend at {} has no name", backend.base_url));
            } else if !names.insert(backend.name.as_str()) {
                errors.push(format!("duplicate backend name `{}`", backend.name));
            }
            if backend.base_url.trim().is_empty() {
                errors.push(format!("backend `{}` has an empty base_url", backend.name));
            } else if !is_http_url(&backend.base_url) {
                errors.push(format!("backend `{}` base_url is not an http(s) URL: {}", backend.name, backend.base_url));
            }
            if backend.delay_secs.is_some_and(|delay| !delay.is_finite() || delay < 0.0) {
                errors.push(format!("backend `{}` delay_secs must be a non-negative number", backend.name));
            }
        }
        if errors.is_empty() { Ok(()) } else { exn::bail!(ErrorKind::Invalid(errors)) }
    }

    /// The canonicalizer described by `canon`.
    pub fn canonicalizer(&self) -> Canonicalizer {
        Canonicalizer::new(self.canon.preserve_trailing_slash.iter().cloned())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "hermes")
}

fn default_database_path() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from("web.db"), |dirs| dirs.data_dir().join("web.db"))
}

/// `config.toml` in the platform configuration directory.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn is_http_url(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") && !host.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::time::Duration;

    const CONFIG: &str = r#"
        database = "fetch.db"
        source = "laptop"
        compression = "bzip2"

        [canon]
        preserve_trailing_slash = ["phoenixsong.net", "fictionalley.org"]

        [direct]
        timeout_secs = 20
        fallback = true

        [[backends]]
        name = "weaver"
        base_url = "https://primary.example/weaver/"
        api_key = "primaryApiKey"
        username = "weaver_api"
        password = "primaryPass"

        [[backends]]
        name = "skitter"
        kind = "secondary"
        base_url = "https://secondary.example/skitter/"
        timeout_secs = 10
    "#;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.compression, Compression::Zlib);
        assert_eq!(config.direct.timeout(), Duration::from_secs(15));
        assert_eq!(config.direct.cookies.len(), 3);
        assert!(!config.stale.enabled);
        assert_eq!(config.canonicalizer(), Canonicalizer::default());
    }

    #[test]
    fn test_load_file() {
        Jail::expect_with(|jail| {
            jail.create_file("hermes.toml", CONFIG)?;
            let config = Config::load(Some(Path::new("hermes.toml"))).unwrap();
            assert_eq!(config.database, PathBuf::from("fetch.db"));
            assert_eq!(config.source.as_deref(), Some("laptop"));
            assert_eq!(config.compression, Compression::Bzip2);
            assert_eq!(config.direct.timeout(), Duration::from_secs(20));
            assert!(config.direct.fallback);
            // Untouched nested defaults survive a partial table.
            assert_eq!(config.direct.user_agent, DEFAULT_USER_AGENT);
            assert_eq!(config.backends.len(), 2);
            assert_eq!(config.backends[0].kind, BackendKind::Primary);
            assert_eq!(config.backends[0].timeout(), Duration::from_secs(90));
            assert_eq!(config.backends[1].kind, BackendKind::Secondary);
            assert_eq!(config.backends[1].timeout(), Duration::from_secs(10));
            assert_eq!(config.backends[1].api_key, "");
            assert_eq!(
                config.canonicalizer().canonicalize("http://www.fictionalley.org/authors/").unwrap(),
                "http://www.fictionalley.org/authors/"
            );
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|_| {
            let err = Config::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert_eq!(*err, ErrorKind::NotFound(PathBuf::from("nope.toml")));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("hermes.toml", CONFIG)?;
            jail.set_env("HERMES_DIRECT__TIMEOUT_SECS", "45");
            jail.set_env("HERMES_COMPRESSION", "gzip");
            jail.set_env("HERMES_STALE_BEFORE", "1234");
            jail.set_env("OIL_SCRAPE_SOURCE", "prod");
            let config = Config::load(Some(Path::new("hermes.toml"))).unwrap();
            assert_eq!(config.direct.timeout_secs, 45);
            assert_eq!(config.compression, Compression::Gzip);
            assert_eq!(config.stale, StaleConfig { enabled: true, before_id: Some(1234) });
            assert_eq!(config.source.as_deref(), Some("prod"));
            Ok(())
        });
    }

    #[rstest]
    #[case(&[], StaleConfig::default(), None)]
    #[case(&[("HERMES_STALE", "")], StaleConfig { enabled: true, before_id: None }, None)]
    #[case(&[("HERMES_STALE_BEFORE", " 99 ")], StaleConfig { enabled: true, before_id: Some(99) }, None)]
    #[case(&[("OIL_SCRAPE_SOURCE", "old")], StaleConfig::default(), Some("old"))]
    #[case(
        &[("OIL_SCRAPE_SOURCE", "old"), ("HERMES_SCRAPE_SOURCE", "new")],
        StaleConfig::default(),
        Some("new")
    )]
    fn test_legacy_env(#[case] env: &[(&str, &str)], #[case] stale: StaleConfig, #[case] source: Option<&str>) {
        let mut config = Config::default();
        config.apply_legacy_env(vars(env)).unwrap();
        assert_eq!(config.stale, stale);
        assert_eq!(config.source.as_deref(), source);
    }

    #[test]
    fn test_legacy_env_rejects_bad_cutoff() {
        let mut config = Config::default();
        let err = config.apply_legacy_env(vars(&[("HERMES_STALE_BEFORE", "yesterday")])).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidEnv(ENV_STALE_BEFORE));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bad.toml",
                r#"
                compression = "none"

                [[backends]]
                name = "weaver"
                base_url = ""

                [[backends]]
                name = "weaver"
                base_url = "ftp://files.example/"
                "#,
            )?;
            let err = Config::load(Some(Path::new("bad.toml"))).unwrap_err();
            let ErrorKind::Invalid(problems) = &*err else {
                panic!("unexpected error: {err:?}");
            };
            assert_eq!(problems.len(), 4, "{problems:?}");
            assert!(problems.iter().any(|p| p.contains("compression")));
            assert!(problems.iter().any(|p| p.contains("duplicate backend name")));
            assert!(problems.iter().any(|p| p.contains("empty base_url")));
            assert!(problems.iter().any(|p| p.contains("ftp://")));
            Ok(())
        });
    }

    #[rstest]
    #[case("https://primary.example/weaver/", true)]
    #[case("HTTP://127.0.0.1:8080", true)]
    #[case("https:///nohost", false)]
    #[case("primary.example/weaver/", false)]
    #[case("ftp://files.example/", false)]
    fn test_is_http_url(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_http_url(url), expected);
    }
}
