//! Remote caching-fetch services.
//!
//! A backend is a service that fetches pages on our behalf and keeps its own
//! archive of everything it fetched. The chain in [`FetchCache`](crate::FetchCache)
//! asks backends first and only fetches directly when all of them fail.

mod client;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod primary;
mod secondary;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
pub use self::primary::{PRIMARY_USER_AGENT, PrimaryBackend};
pub use self::secondary::{SECONDARY_USER_AGENT, SecondaryBackend};
use crate::decode::Decoder;
use crate::error::Result;
use async_trait::async_trait;
use hermes_config::{BackendConfig, BackendKind};
use hermes_store::Capture;
use std::sync::Arc;

/// A shareable backend, as held by the chain.
pub type BackendHandle = Arc<dyn Backend>;

/// What to look up in a backend's archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheQuery {
    /// Search the archive; a URL is the usual query.
    Query(String),
    /// Exact URL match.
    Url(String),
}
impl CacheQuery {
    fn param(&self) -> (&'static str, &str) {
        match self {
            Self::Query(query) => ("q", query),
            Self::Url(url) => ("u", url),
        }
    }
}

/// Operations every remote caching-fetch service offers.
///
/// Results are [`Capture`]s, not records: persisting them is the caller's job.
/// A capture's `url` and `created_at` are the backend's, which may differ from
/// the requested URL (redirects) and from now (archived copies).
///
/// Expected misses are `Ok(None)`; errors are reserved for failed requests
/// and undecodable content.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of the configured backend, for logging.
    fn name(&self) -> &str;

    /// Look something up in the backend's archive without fetching.
    ///
    /// With `reverse`, the oldest archived copy is returned instead of the newest.
    async fn cache_with(&self, query: &CacheQuery, reverse: bool) -> Result<Option<Capture>>;

    /// Does the backend already have `url`?
    async fn cache_only(&self, url: &str) -> Result<Option<Capture>> {
        self.cache_with(&CacheQuery::Query(url.to_string()), false).await
    }

    /// Have the backend fetch `url` live. Not-found is an error here.
    async fn crawl(&self, url: &str) -> Result<Capture>;

    /// Whether [`soft_crawl`](Self::soft_crawl) is native to the backend.
    fn supports_soft_crawl(&self) -> bool {
        false
    }

    /// Archived copy if there is one, live fetch otherwise.
    ///
    /// The default asks [`cache_only`](Self::cache_only) then
    /// [`crawl`](Self::crawl).
    async fn soft_crawl(&self, url: &str) -> Result<Capture> {
        match self.cache_only(url).await? {
            Some(capture) => Ok(capture),
            None => self.crawl(url).await,
        }
    }
}

/// Build the backend a configuration entry describes.
pub fn from_config(config: &BackendConfig, decoder: Decoder) -> Result<BackendHandle> {
    Ok(match config.kind {
        BackendKind::Primary => Arc::new(PrimaryBackend::new(config, decoder)?),
        BackendKind::Secondary => Arc::new(SecondaryBackend::new(config, decoder)?),
    })
}
