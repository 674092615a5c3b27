use crate::AliasPattern;
use crate::error::{ErrorKind, Result};

const SCHEME_SEPARATOR: &str = "://";

/// Domains on which a trailing slash is part of the resource identity
/// (`/story/1` and `/story/1/` are different pages).
pub const DEFAULT_PRESERVE_TRAILING_SLASH: &[&str] = &["phoenixsong.net"];

/// Normalizes URLs into the form stored in (and looked up from) the fetch log.
///
/// Canonicalization is purely textual:
///
/// 1. Surrounding whitespace is trimmed.
/// 2. The URL is split at the first `://`; runs of `/` in the remainder are
///    collapsed into a single `/`.
/// 3. A trailing `/` is removed, unless the host is on the trailing-slash
///    allow-list (the domain itself or any subdomain of it).
///
/// The operation is idempotent.
///
/// # Examples
///
/// ```
/// use hermes_canon::Canonicalizer;
///
/// let canon = Canonicalizer::default();
/// assert_eq!(
///     canon.canonicalize("https://www.fanfiction.net//s/12345/1/").unwrap(),
///     "https://www.fanfiction.net/s/12345/1",
/// );
/// assert_eq!(
///     canon.canonicalize("http://www.phoenixsong.net/fanfiction/story/1/").unwrap(),
///     "http://www.phoenixsong.net/fanfiction/story/1/",
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonicalizer {
    preserve_trailing_slash: Vec<String>,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PRESERVE_TRAILING_SLASH.iter().copied())
    }
}

impl Canonicalizer {
    /// Create a canonicalizer with the given trailing-slash allow-list.
    pub fn new(preserve_trailing_slash: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            preserve_trailing_slash: preserve_trailing_slash
                .into_iter()
                .map(|domain| {
                    let domain: String = domain.into();
                    domain.trim_start_matches('.').to_lowercase()
                })
                .collect(),
        }
    }

    /// Domains on which trailing slashes are kept.
    pub fn preserved_domains(&self) -> &[String] {
        &self.preserve_trailing_slash
    }

    /// Canonicalize a URL.
    ///
    /// Raises [`ErrorKind::MalformedUrl`] if there is no `scheme://` prefix.
    pub fn canonicalize(&self, url: impl AsRef<str>) -> Result<String> {
        let url = url.as_ref().trim();
        let Some((scheme, rest)) = url.split_once(SCHEME_SEPARATOR) else {
            exn::bail!(ErrorKind::MalformedUrl(url.to_string()));
        };
        if scheme.is_empty() {
            exn::bail!(ErrorKind::MalformedUrl(url.to_string()));
        }
        let mut collapsed = String::with_capacity(rest.len());
        for c in rest.chars() {
            if c == '/' && collapsed.ends_with('/') {
                continue;
            }
            collapsed.push(c);
        }
        if collapsed.ends_with('/') && !self.preserves_trailing_slash(host_of(&collapsed)) {
            collapsed.pop();
        }
        Ok(format!("{scheme}{SCHEME_SEPARATOR}{collapsed}"))
    }

    /// Canonicalize a URL and derive its [`AliasPattern`].
    pub fn alias_pattern(&self, url: impl AsRef<str>) -> Result<AliasPattern> {
        Ok(AliasPattern::from_canonical(&self.canonicalize(url)?))
    }

    fn preserves_trailing_slash(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.preserve_trailing_slash.iter().any(|domain| {
            host == *domain || host.strip_suffix(domain.as_str()).is_some_and(|sub| sub.ends_with('.'))
        })
    }
}

/// The host part of everything after `scheme://`, without userinfo or port.
fn host_of(rest: &str) -> &str {
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    host.split(':').next().unwrap_or_default()
}
