use crate::backend::{self, BackendHandle, CacheQuery};
use crate::decode::Decoder;
use crate::direct::DirectFetcher;
use crate::error::{ErrorKind, Result};
use crate::stale::{self, StaleMode};
use exn::ResultExt;
use hermes_canon::AliasPattern;
use hermes_config::{Config, DirectConfig};
use hermes_store::{Capture, Database, FetchRecord, Filter, Repository};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;
use tracing::instrument;

/// Per-call settings shared by every fetch mode.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Ceiling for a direct request.
    pub timeout: Duration,
    /// Politeness hint for the pause after a direct request.
    pub delay: f64,
    /// Fetch directly when every backend failed.
    pub fallback: bool,
}
impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&DirectConfig::default())
    }
}
impl From<&DirectConfig> for FetchOptions {
    fn from(config: &DirectConfig) -> Self {
        Self { timeout: config.timeout(), delay: config.delay_secs, fallback: config.fallback }
    }
}
impl FetchOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Settings for [`FetchCache::soft_fetch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftOptions {
    pub fetch: FetchOptions,
    /// Look the stored copy up by pattern instead of by exact URL.
    pub alias: Option<AliasPattern>,
    /// Stored copies older than this are ignored.
    pub musty_threshold: Option<Duration>,
}
impl From<FetchOptions> for SoftOptions {
    fn from(fetch: FetchOptions) -> Self {
        Self { fetch, alias: None, musty_threshold: None }
    }
}
impl SoftOptions {
    pub fn with_alias(mut self, alias: Option<AliasPattern>) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_musty_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.musty_threshold = threshold;
        self
    }
}

/// The fetch context: response store, ordered backend chain and direct
/// fetcher.
///
/// Cheap to clone and safe to share between tasks; no lock is held across a
/// request, and concurrent appends are serialized by the database.
#[derive(Clone)]
pub struct FetchCache {
    db: Database,
    repo: Repository,
    direct: DirectFetcher,
    backends: Arc<[BackendHandle]>,
    stale: Option<StaleMode>,
    defaults: FetchOptions,
}

impl Debug for FetchCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let backends: Vec<&str> = self.backends.iter().map(|backend| backend.name()).collect();
        f.debug_struct("FetchCache")
            .field("db", &self.db)
            .field("backends", &backends)
            .field("stale", &self.stale)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl FetchCache {
    /// A context without backends; the store is the direct fetcher's.
    pub fn new(db: Database, direct: DirectFetcher) -> Self {
        Self {
            db,
            repo: direct.repository().clone(),
            stale: direct.stale(),
            direct,
            backends: Arc::from(Vec::new()),
            defaults: FetchOptions::default(),
        }
    }

    /// Backends in order of preference, most preferred first.
    pub fn with_backends(mut self, backends: impl IntoIterator<Item = BackendHandle>) -> Self {
        self.backends = backends.into_iter().collect();
        self
    }

    /// Enable (or disable) stale mode for every fetch made through this context.
    pub fn with_stale(mut self, stale: Option<StaleMode>) -> Self {
        self.stale = stale;
        self.direct = self.direct.with_stale(stale);
        self
    }

    pub fn with_defaults(mut self, defaults: FetchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Build the whole context from configuration: open (and migrate) the
    /// database, then set up the direct fetcher and every backend.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Setup)?;
        if let Some(parent) = config.database.parent() {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Setup)?;
        }
        let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Store)?;
        let repo = Repository::from(&db)
            .with_canonicalizer(config.canonicalizer())
            .with_compression(config.compression);
        let direct = DirectFetcher::new(repo, &config.direct)?.with_source(config.source.clone());
        let decoder = Decoder::new(config.direct.decode_failure_dump.clone());
        let backends = config
            .backends
            .iter()
            .map(|backend| backend::from_config(backend, decoder.clone()))
            .collect::<Result<Vec<_>>>()?;
        let stale = config.stale.enabled.then_some(StaleMode { before_id: config.stale.before_id });
        tracing::info!(
            database = %config.database.display(),
            backends = backends.len(),
            stale = stale.is_some(),
            "Fetch cache ready"
        );
        Ok(Self::new(db, direct)
            .with_backends(backends)
            .with_stale(stale)
            .with_defaults(FetchOptions::from(&config.direct)))
    }

    /// Close the database. Clones of this context must not be used afterwards.
    pub async fn close(self) {
        self.db.close().await;
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn direct(&self) -> &DirectFetcher {
        &self.direct
    }

    pub fn backends(&self) -> &[BackendHandle] {
        &self.backends
    }

    pub fn stale(&self) -> Option<StaleMode> {
        self.stale
    }

    /// Configured per-call defaults.
    pub fn defaults(&self) -> &FetchOptions {
        &self.defaults
    }

    /// Configured per-call defaults, as soft-fetch options.
    pub fn soft_options(&self) -> SoftOptions {
        SoftOptions::from(self.defaults.clone())
    }

    pub fn canonicalize(&self, url: &str) -> Result<String> {
        crate::canonicalize(&self.repo, url)
    }

    // =========================================================================
    // Fetch modes
    // =========================================================================

    /// Fetch a fresh copy of `url`.
    ///
    /// Each backend's `crawl` is tried in order and the first success is
    /// stored and returned; failures are logged and skipped. A page the
    /// origin answered with anything but `200` is stored, then skipped.
    /// When all of them fail, `options.fallback` decides between a direct
    /// fetch and [`ErrorKind::AllBackendsFailed`]. Undecodable content and
    /// store failures abort at once.
    #[instrument(level = "debug", skip(self, options))]
    pub async fn force_fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchRecord> {
        let url = self.canonicalize(url)?;
        if let Some(mode) = self.stale {
            tracing::info!(%url, "Stale mode, serving from the store");
            return stale::lookup(&self.repo, &url, None, mode.before_id).await;
        }
        self.crawl_chain(&url, options, false).await
    }

    /// Fetch `url`, preferring any copy that already exists.
    ///
    /// In order: the newest stored copy (by exact URL, or by `options.alias`);
    /// each backend's archive, least preferred backend first; then a fresh
    /// copy as [`force_fetch`](Self::force_fetch) would get one, except that
    /// backends with a native soft crawl are asked for that instead.
    ///
    /// A stored copy older than `options.musty_threshold` counts as missing
    /// and skips straight to a fresh copy. Archived copies the origin did not
    /// serve with a `200` are stored but count as missing too.
    #[instrument(level = "debug", skip(self, options), fields(alias = ?options.alias))]
    pub async fn soft_fetch(&self, url: &str, options: &SoftOptions) -> Result<FetchRecord> {
        let url = self.canonicalize(url)?;
        if let Some(mode) = self.stale {
            tracing::info!(%url, "Stale mode, serving from the store");
            return stale::lookup(&self.repo, &url, options.alias.as_ref(), mode.before_id).await;
        }
        let stored = match &options.alias {
            Some(pattern) => self.repo.most_recent_like(pattern, Filter::default()).await,
            None => self.repo.most_recent(&url, Filter::default()).await,
        }
        .or_raise(|| ErrorKind::Store)?;
        if let Some(record) = stored {
            let musty = options
                .musty_threshold
                .is_some_and(|threshold| record.is_musty(threshold, UtcDateTime::now()));
            if !musty {
                tracing::debug!(id = record.id, %url, "Serving stored copy");
                return Ok(record);
            }
            tracing::info!(id = record.id, %url, created_at = %record.created_at, "Stored copy is musty, refetching");
            return self.crawl_chain(&url, &options.fetch, false).await;
        }

        for backend in self.backends.iter().rev() {
            match backend.cache_only(&url).await {
                Ok(Some(capture)) => {
                    let record = self.persist(capture, backend.name()).await?;
                    if record.is_success() {
                        return Ok(record);
                    }
                    tracing::debug!(backend = backend.name(), id = record.id, status = record.status, "Archived copy is unusable");
                },
                Ok(None) => tracing::debug!(backend = backend.name(), %url, "Not archived"),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => tracing::warn!(backend = backend.name(), %url, error = ?err, "Archive lookup failed"),
            }
        }
        self.crawl_chain(&url, &options.fetch, true).await
    }

    /// The stored copy of `url`, never touching the network.
    ///
    /// `before_id` hides newer records; in stale mode the configured cutoff
    /// applies too, whichever is lower. Raises
    /// [`ErrorKind::NoSuchCachedRecord`] when nothing qualifies.
    #[instrument(level = "debug", skip(self))]
    pub async fn stale_only_fetch(
        &self,
        url: &str,
        alias: Option<&AliasPattern>,
        before_id: Option<i64>,
    ) -> Result<FetchRecord> {
        let url = self.canonicalize(url)?;
        let before_id = match self.stale {
            Some(mode) => mode.bound(before_id),
            None => before_id,
        };
        stale::lookup(&self.repo, &url, alias, before_id).await
    }

    async fn crawl_chain(&self, url: &str, options: &FetchOptions, soft: bool) -> Result<FetchRecord> {
        for backend in self.backends.iter() {
            let attempt = if soft && backend.supports_soft_crawl() {
                backend.soft_crawl(url).await
            } else {
                backend.crawl(url).await
            };
            match attempt {
                Ok(capture) => {
                    let record = self.persist(capture, backend.name()).await?;
                    if record.is_success() {
                        return Ok(record);
                    }
                    tracing::warn!(backend = backend.name(), %url, status = record.status, "Origin refused the backend, trying the next one");
                },
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => tracing::warn!(backend = backend.name(), %url, error = ?err, "Backend failed, trying the next one"),
            }
        }
        if !options.fallback {
            exn::bail!(ErrorKind::AllBackendsFailed(url.to_string()));
        }
        tracing::info!(%url, "Falling back to a direct fetch");
        match self.direct.fetch(url, options.timeout, options.delay).await {
            Ok(record) => Ok(record),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => Err(err.raise(ErrorKind::AllBackendsFailed(url.to_string()))),
        }
    }

    async fn persist(&self, capture: Capture, backend: &str) -> Result<FetchRecord> {
        let record = self
            .repo
            .append(&capture, self.direct.source())
            .await
            .or_raise(|| ErrorKind::Store)?;
        tracing::info!(backend, id = record.id, url = %record.url, status = record.status, "Stored backend capture");
        Ok(record)
    }

    // =========================================================================
    // Caller-facing wrappers
    // =========================================================================

    /// Force fetch.
    pub async fn scrape(&self, url: &str, options: &FetchOptions) -> Result<FetchRecord> {
        self.force_fetch(url, options).await
    }

    /// Soft fetch that tolerates a miss: `None` when the chain (and the
    /// fallback, if enabled) had nothing, or stale mode had nothing stored.
    pub async fn soft_scrape_with_meta(&self, url: &str, options: &SoftOptions) -> Result<Option<FetchRecord>> {
        match self.soft_fetch(url, options).await {
            Ok(record) => Ok(Some(record)),
            Err(err) if matches!(&*err, ErrorKind::AllBackendsFailed(_) | ErrorKind::NoSuchCachedRecord(_)) => {
                tracing::warn!(url, error = ?err, "Soft fetch missed");
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }

    /// Body of [`soft_scrape_with_meta`](Self::soft_scrape_with_meta).
    pub async fn soft_scrape(&self, url: &str, options: &SoftOptions) -> Result<Option<String>> {
        Ok(self.soft_scrape_with_meta(url, options).await?.and_then(|record| record.body))
    }

    /// Body of the newest successful stored copy.
    pub async fn most_recent_scrape(&self, url: &str) -> Result<Option<String>> {
        let record = self.most_recent_scrape_with_meta(url, None, Filter::default()).await?;
        Ok(record.and_then(|record| record.body))
    }

    /// Newest stored record matching `filter`, by exact URL or by `alias`.
    pub async fn most_recent_scrape_with_meta(
        &self,
        url: &str,
        alias: Option<&AliasPattern>,
        filter: Filter,
    ) -> Result<Option<FetchRecord>> {
        let url = self.canonicalize(url)?;
        match alias {
            Some(pattern) => self.repo.most_recent_like(pattern, filter).await,
            None => self.repo.most_recent(&url, filter).await,
        }
        .or_raise(|| ErrorKind::Store)
    }

    pub async fn last_url_like(&self, pattern: &AliasPattern) -> Result<Option<String>> {
        self.repo.last_like(pattern).await.or_raise(|| ErrorKind::Store)
    }

    pub async fn all_url_like(&self, pattern: &AliasPattern) -> Result<Vec<String>> {
        self.repo.all_like(pattern).await.or_raise(|| ErrorKind::Store)
    }

    pub async fn last_url_like_or_default(&self, default: &str, patterns: &[AliasPattern]) -> Result<String> {
        self.repo.last_like_or_default(default, patterns).await.or_raise(|| ErrorKind::Store)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Store `body` as a successful capture of `url` made at `created_at`,
    /// unless a successful copy is already stored.
    pub async fn import(&self, url: &str, created_at: UtcDateTime, body: String) -> Result<Option<FetchRecord>> {
        let url = self.canonicalize(url)?;
        if self.repo.most_recent(&url, Filter::default()).await.or_raise(|| ErrorKind::Store)?.is_some() {
            tracing::info!(%url, "Already stored, not importing");
            return Ok(None);
        }
        let record = self
            .repo
            .append(&Capture::success(url, created_at, body), self.direct.source())
            .await
            .or_raise(|| ErrorKind::Store)?;
        Ok(Some(record))
    }

    /// Copy the least preferred backend's archived copy of `url` into the
    /// store. For first chapters (URLs ending in `/1`) the oldest copy is
    /// taken, the newest otherwise.
    pub async fn recache(&self, url: &str) -> Result<Option<FetchRecord>> {
        let url = self.canonicalize(url)?;
        let backend = self.network_backend(self.backends.last())?;
        let reverse = url.ends_with("/1");
        match backend.cache_with(&CacheQuery::Query(url), reverse).await? {
            Some(capture) => Ok(Some(self.persist(capture, backend.name()).await?)),
            None => Ok(None),
        }
    }

    /// Crawl `url` through the most preferred backend and store the result.
    pub async fn rescrape(&self, url: &str) -> Result<FetchRecord> {
        let url = self.canonicalize(url)?;
        let backend = self.network_backend(self.backends.first())?;
        let capture = backend.crawl(&url).await?;
        self.persist(capture, backend.name()).await
    }

    fn network_backend<'a>(&self, backend: Option<&'a BackendHandle>) -> Result<&'a BackendHandle> {
        if self.stale.is_some() {
            exn::bail!(ErrorKind::Unsupported("backend requests in stale mode"));
        }
        match backend {
            Some(backend) => Ok(backend),
            None => exn::bail!(ErrorKind::NoBackends),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use hermes_store::STATUS_OK;
    use rstest::rstest;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WORK: &str = "https://archiveofourown.org/works/123";

    struct Harness {
        cache: FetchCache,
        backends: Vec<Arc<MockBackend>>,
    }
    impl Harness {
        async fn new(backends: Vec<MockBackend>) -> Self {
            let db = Database::connect_in_memory().await.unwrap();
            let config = DirectConfig { decode_failure_dump: None, ..DirectConfig::default() };
            let direct = DirectFetcher::new(Repository::from(&db), &config).unwrap();
            let backends: Vec<Arc<MockBackend>> = backends.into_iter().map(Arc::new).collect();
            let handles = backends.iter().map(|backend| backend.clone() as BackendHandle);
            let cache = FetchCache::new(db, direct).with_backends(handles);
            Self { cache, backends }
        }

        fn calls(&self) -> Vec<usize> {
            self.backends.iter().map(|backend| backend.calls()).collect()
        }

        async fn count(&self) -> u64 {
            self.cache.repository().count().await.unwrap()
        }

        async fn store(&self, url: &str, age: Duration, body: &str) -> FetchRecord {
            let capture = Capture::success(url, UtcDateTime::now() - age, body);
            self.cache.repository().append(&capture, None).await.unwrap()
        }
    }

    fn options(fallback: bool) -> FetchOptions {
        FetchOptions { timeout: Duration::from_secs(5), delay: 0.0, fallback }
    }

    #[tokio::test]
    async fn test_force_fetch_takes_first_success() {
        let h = Harness::new(vec![MockBackend::new("a").failing(), MockBackend::new("b"), MockBackend::new("c")]).await;

        // Fallback enabled, but never needed.
        let record = h.cache.force_fetch(&format!("{WORK}/"), &options(true)).await.unwrap();
        assert_eq!(record.url, WORK);
        assert_eq!(record.body.as_deref(), Some(h.backends[1].crawled_body(WORK).as_str()));
        assert_eq!(h.backends[0].crawl_calls(), 1);
        assert_eq!(h.backends[1].crawl_calls(), 1);
        assert_eq!(h.calls()[2], 0);
        assert_eq!(h.count().await, 1);
    }

    #[tokio::test]
    async fn test_force_fetch_ignores_stored_copies() {
        let h = Harness::new(vec![MockBackend::new("a").with_page(WORK, "archived")]).await;
        h.store(WORK, Duration::ZERO, "stored").await;

        let record = h.cache.force_fetch(WORK, &options(false)).await.unwrap();
        assert_eq!(record.body.as_deref(), Some(h.backends[0].crawled_body(WORK).as_str()));
        assert_eq!(h.backends[0].cache_calls(), 0);
        assert_eq!(h.count().await, 2);
    }

    #[tokio::test]
    async fn test_force_fetch_all_backends_failed() {
        let h = Harness::new(vec![MockBackend::new("a").failing(), MockBackend::new("b").failing()]).await;

        let err = h.cache.force_fetch(WORK, &options(false)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::AllBackendsFailed(WORK.to_string()));
        assert_eq!(h.calls(), vec![1, 1]);
        assert_eq!(h.count().await, 0);
    }

    #[tokio::test]
    async fn test_force_fetch_falls_back_to_direct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("from origin"))
            .expect(1)
            .mount(&server)
            .await;
        let h = Harness::new(vec![MockBackend::new("a").failing()]).await;
        let url = format!("{}/works/9", server.uri());

        let record = h.cache.force_fetch(&url, &options(true)).await.unwrap();
        assert_eq!(record.body.as_deref(), Some("from origin"));
        assert_eq!(h.count().await, 1);
    }

    #[tokio::test]
    async fn test_force_fetch_failed_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).expect(1).mount(&server).await;
        let h = Harness::new(vec![]).await;
        let url = format!("{}/works/9", server.uri());

        let err = h.cache.force_fetch(&url, &options(true)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::AllBackendsFailed(url.clone()));
        // The direct attempt is still on record.
        let failure = h.cache.repository().most_recent(&url, Filter::any_status()).await.unwrap().unwrap();
        assert_eq!(failure.status, 404);
    }

    #[tokio::test]
    async fn test_decode_failures_are_not_swallowed() {
        let decode = ErrorKind::Decode { url: WORK.to_string() };
        let h = Harness::new(vec![MockBackend::new("a").failing_with(decode.clone()), MockBackend::new("b")]).await;

        let err = h.cache.force_fetch(WORK, &options(false)).await.unwrap_err();
        assert_eq!(*err, decode);
        assert_eq!(h.calls(), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_soft_fetch_serves_stored_copy() {
        let h = Harness::new(vec![MockBackend::new("a"), MockBackend::new("b")]).await;
        let stored = h.store(WORK, Duration::from_secs(3600), "stored").await;

        let record = h.cache.soft_fetch(&format!("{WORK}/"), &SoftOptions::from(options(false))).await.unwrap();
        assert_eq!(record, stored);
        assert_eq!(h.calls(), vec![0, 0]);
        assert_eq!(h.count().await, 1);
    }

    #[tokio::test]
    async fn test_soft_fetch_asks_archives_in_reverse() {
        let h = Harness::new(vec![
            MockBackend::new("primary").with_page(WORK, "primary copy"),
            MockBackend::new("secondary").with_page(WORK, "secondary copy"),
        ])
        .await;

        let record = h.cache.soft_fetch(WORK, &SoftOptions::from(options(false))).await.unwrap();
        assert_eq!(record.body.as_deref(), Some("secondary copy"));
        assert_eq!(h.calls(), vec![0, 1]);
        // The archived copy is now stored locally too.
        assert_eq!(h.cache.most_recent_scrape(WORK).await.unwrap().as_deref(), Some("secondary copy"));
    }

    fn not_found(url: &str) -> Capture {
        Capture { url: url.to_string(), created_at: UtcDateTime::now(), status: 404, body: Some("Not Found page".to_string()) }
    }

    #[tokio::test]
    async fn test_soft_fetch_skips_unusable_archived_copies() {
        let h = Harness::new(vec![
            MockBackend::new("primary").with_page(WORK, "primary copy"),
            MockBackend::new("secondary").with_capture(not_found(WORK)),
        ])
        .await;
        let options = SoftOptions::from(options(false));

        let record = h.cache.soft_fetch(WORK, &options).await.unwrap();
        assert_eq!(record.status, STATUS_OK);
        assert_eq!(record.body.as_deref(), Some("primary copy"));
        // The 404 is kept on record, but never served.
        assert_eq!(h.count().await, 2);
        let failure = h.cache.repository().most_recent(WORK, Filter::default().with_status(Some(404))).await;
        assert!(failure.unwrap().is_some());

        assert_eq!(h.cache.soft_fetch(WORK, &options).await.unwrap(), record);
        assert_eq!(h.calls(), vec![1, 1]);
        assert_eq!(h.count().await, 2);
    }

    #[tokio::test]
    async fn test_unusable_archived_copy_falls_through_to_crawl() {
        let h = Harness::new(vec![MockBackend::new("a").with_capture(not_found(WORK))]).await;

        let record = h.cache.soft_fetch(WORK, &SoftOptions::from(options(false))).await.unwrap();
        assert_eq!(record.body.as_deref(), Some(h.backends[0].crawled_body(WORK).as_str()));
        assert_eq!(h.backends[0].cache_calls(), 1);
        assert_eq!(h.backends[0].crawl_calls(), 1);
        assert_eq!(h.count().await, 2);
    }

    #[tokio::test]
    async fn test_crawl_refused_by_origin_tries_next_backend() {
        // A native soft crawl hands back the archived 404.
        let h = Harness::new(vec![
            MockBackend::new("a").with_capture(not_found(WORK)).with_soft_crawl(),
            MockBackend::new("b"),
        ])
        .await;

        let record = h.cache.soft_fetch(WORK, &SoftOptions::from(options(false))).await.unwrap();
        assert_eq!(record.body.as_deref(), Some(h.backends[1].crawled_body(WORK).as_str()));
        assert_eq!(h.backends[0].soft_crawl_calls(), 1);
        assert_eq!(h.backends[1].crawl_calls(), 1);
        // Two archived 404s (cache lookup and soft crawl) and the fresh copy.
        assert_eq!(h.count().await, 3);
    }

    #[tokio::test]
    async fn test_soft_fetch_skips_failing_archives() {
        let h = Harness::new(vec![
            MockBackend::new("primary").with_page(WORK, "primary copy"),
            MockBackend::new("secondary").failing(),
        ])
        .await;

        let record = h.cache.soft_fetch(WORK, &SoftOptions::from(options(false))).await.unwrap();
        assert_eq!(record.body.as_deref(), Some("primary copy"));
    }

    #[tokio::test]
    async fn test_soft_fetch_miss_prefers_soft_crawl() {
        let h = Harness::new(vec![MockBackend::new("primary").with_soft_crawl(), MockBackend::new("secondary")]).await;

        let record = h.cache.soft_fetch(WORK, &SoftOptions::from(options(false))).await.unwrap();
        assert_eq!(record.body.as_deref(), Some(h.backends[0].crawled_body(WORK).as_str()));
        assert_eq!(h.backends[0].cache_calls(), 1);
        assert_eq!(h.backends[0].soft_crawl_calls(), 1);
        assert_eq!(h.backends[0].crawl_calls(), 0);
        assert_eq!(h.backends[1].cache_calls(), 1);
        assert_eq!(h.backends[1].crawl_calls(), 0);
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some(200), false)]
    #[case(Some(50), true)]
    #[tokio::test]
    async fn test_soft_fetch_musty_threshold(#[case] threshold: Option<u64>, #[case] refetch: bool) {
        let h = Harness::new(vec![MockBackend::new("a").with_page(WORK, "archived")]).await;
        let stored = h.store(WORK, Duration::from_secs(100), "stored").await;
        let options = SoftOptions::from(options(false)).with_musty_threshold(threshold.map(Duration::from_secs));

        let record = h.cache.soft_fetch(WORK, &options).await.unwrap();
        if refetch {
            // A fresh copy: neither the stored one nor the archived one.
            assert_eq!(record.body.as_deref(), Some(h.backends[0].crawled_body(WORK).as_str()));
            assert_eq!(h.backends[0].crawl_calls(), 1);
            assert_eq!(h.backends[0].cache_calls(), 0);
            assert_eq!(h.count().await, 2);
        } else {
            assert_eq!(record, stored);
            assert_eq!(h.calls(), vec![0]);
        }
    }

    #[tokio::test]
    async fn test_soft_fetch_by_alias() {
        let h = Harness::new(vec![MockBackend::new("a")]).await;
        let renamed = "https://forums.spacebattles.com/threads/quest-redux.12345/page-2";
        let stored = h.store(renamed, Duration::ZERO, "renamed thread").await;
        let old = "https://forums.spacebattles.com/threads/quest.12345/page-2";

        let alias = h.cache.repository().canonicalizer().alias_pattern(old).unwrap();
        let options = SoftOptions::from(options(false)).with_alias(Some(alias));
        assert_eq!(h.cache.soft_fetch(old, &options).await.unwrap(), stored);
        assert_eq!(h.calls(), vec![0]);
    }

    #[tokio::test]
    async fn test_stale_only_miss_makes_no_calls() {
        let h = Harness::new(vec![MockBackend::new("a").with_page(WORK, "archived")]).await;

        let err = h.cache.stale_only_fetch(WORK, None, None).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NoSuchCachedRecord(WORK.to_string()));
        assert_eq!(h.calls(), vec![0]);
    }

    #[tokio::test]
    async fn test_stale_mode_replays_snapshot() {
        let h = Harness::new(vec![MockBackend::new("a")]).await;
        let old = h.store(WORK, Duration::from_secs(60), "old").await;
        h.store(WORK, Duration::ZERO, "new").await;
        let cache = h.cache.clone().with_stale(Some(StaleMode { before_id: Some(old.id) }));

        assert_eq!(cache.force_fetch(WORK, &options(true)).await.unwrap(), old);
        assert_eq!(cache.soft_fetch(WORK, &cache.soft_options()).await.unwrap(), old);
        assert_eq!(cache.direct().fetch(WORK, Duration::from_secs(1), 0.0).await.unwrap(), old);
        assert_eq!(cache.stale_only_fetch(WORK, None, Some(old.id - 1)).await.ok(), None);
        let err = cache.force_fetch("https://archiveofourown.org/works/999", &options(true)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoSuchCachedRecord(_)));
        assert!(matches!(&*cache.rescrape(WORK).await.unwrap_err(), ErrorKind::Unsupported(_)));
        assert_eq!(h.calls(), vec![0]);
    }

    #[tokio::test]
    async fn test_soft_scrape_tolerates_miss() {
        let h = Harness::new(vec![MockBackend::new("a").failing()]).await;
        let options = SoftOptions::from(options(false));

        assert_eq!(h.cache.soft_scrape(WORK, &options).await.unwrap(), None);
        h.store(WORK, Duration::ZERO, "stored").await;
        assert_eq!(h.cache.soft_scrape(WORK, &options).await.unwrap().as_deref(), Some("stored"));
    }

    #[tokio::test]
    async fn test_url_enumeration_wrappers() {
        let h = Harness::new(vec![]).await;
        let page = |n: u32| format!("https://forums.sufficientvelocity.com/threads/quest.42/page-{n}");
        h.store(&page(1), Duration::ZERO, "1").await;
        h.store(&page(2), Duration::ZERO, "2").await;
        let pattern = AliasPattern::raw("https://forums.sufficientvelocity.com/threads/%.42/page-%");

        assert_eq!(h.cache.all_url_like(&pattern).await.unwrap(), vec![page(2), page(1)]);
        assert_eq!(h.cache.last_url_like(&pattern).await.unwrap(), Some(page(2)));
        assert_eq!(h.cache.last_url_like_or_default(&page(9), &[]).await.unwrap(), page(9));
        let record = h.cache.most_recent_scrape_with_meta(&page(5), Some(&pattern), Filter::default()).await.unwrap();
        assert_eq!(record.map(|r| r.url), Some(page(2)));
    }

    #[tokio::test]
    async fn test_import_once() {
        let h = Harness::new(vec![]).await;
        let created = UtcDateTime::from_unix_timestamp(1_300_000_000).unwrap();

        let imported = h.cache.import(WORK, created, "from disk".to_string()).await.unwrap().unwrap();
        assert_eq!(imported.created_at, created);
        assert_eq!(imported.status, STATUS_OK);
        assert_eq!(h.cache.import(WORK, created, "again".to_string()).await.unwrap(), None);
        assert_eq!(h.count().await, 1);
    }

    #[tokio::test]
    async fn test_recache_and_rescrape() {
        let chapter = "https://www.fanfiction.net/s/12345/1";
        let h = Harness::new(vec![
            MockBackend::new("primary"),
            MockBackend::new("secondary").with_page(chapter, "archived chapter"),
        ])
        .await;

        let record = h.cache.recache(chapter).await.unwrap().unwrap();
        assert_eq!(record.body.as_deref(), Some("archived chapter"));
        assert_eq!(h.cache.recache("https://www.fanfiction.net/s/12345/2").await.unwrap(), None);
        assert_eq!(h.backends[1].cache_calls(), 2);

        let record = h.cache.rescrape(chapter).await.unwrap();
        assert_eq!(record.body.as_deref(), Some(h.backends[0].crawled_body(chapter).as_str()));
        assert_eq!(h.calls(), vec![1, 2]);

        let empty = Harness::new(vec![]).await;
        assert_eq!(*empty.cache.rescrape(chapter).await.unwrap_err(), ErrorKind::NoBackends);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_soft_fetches() {
        let h = Harness::new(vec![MockBackend::new("a")]).await;
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let cache = h.cache.clone();
                tokio::spawn(async move {
                    let url = format!("{WORK}/chapters/{i}");
                    cache.soft_fetch(&url, &SoftOptions::from(options(false))).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(h.count().await, 8);
        assert_eq!(h.backends[0].crawl_calls(), 8);
    }
}
