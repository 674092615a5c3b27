//! In-memory backend for testing.

use super::{Backend, CacheQuery};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use hermes_store::Capture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory backend for testing.
///
/// The archive is a map from URL to capture. Crawls always succeed (unless
/// the backend is [failing](Self::failing)) with a body naming the backend,
/// and every operation is counted, so tests can assert exactly which
/// backends the chain consulted.
///
/// # Examples
///
/// ```
/// use hermes_fetch::backend::{Backend, MockBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = MockBackend::new("archive").with_page("https://example.com/a", "<html>a</html>");
/// let capture = backend.cache_only("https://example.com/a").await.unwrap().unwrap();
/// assert_eq!(capture.body.as_deref(), Some("<html>a</html>"));
/// assert_eq!(backend.cache_calls(), 1);
/// # }
/// ```
pub struct MockBackend {
    name: String,
    archive: RwLock<HashMap<String, Capture>>,
    failure: Option<ErrorKind>,
    soft_crawl: bool,
    cache_calls: AtomicUsize,
    crawl_calls: AtomicUsize,
    soft_crawl_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            archive: RwLock::new(HashMap::new()),
            failure: None,
            soft_crawl: false,
            cache_calls: AtomicUsize::new(0),
            crawl_calls: AtomicUsize::new(0),
            soft_crawl_calls: AtomicUsize::new(0),
        }
    }

    /// Archive a page, captured now.
    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.with_capture(Capture::success(url, UtcDateTime::now(), body))
    }

    pub fn with_capture(mut self, capture: Capture) -> Self {
        self.archive.get_mut().insert(capture.url.clone(), capture);
        self
    }

    /// Fail every operation with a `503`.
    pub fn failing(self) -> Self {
        self.failing_with(ErrorKind::BackendRequestFailed { status: 503 })
    }

    pub fn failing_with(mut self, kind: ErrorKind) -> Self {
        self.failure = Some(kind);
        self
    }

    /// Report native soft-crawl support.
    pub fn with_soft_crawl(mut self) -> Self {
        self.soft_crawl = true;
        self
    }

    pub fn cache_calls(&self) -> usize {
        self.cache_calls.load(Ordering::SeqCst)
    }

    pub fn crawl_calls(&self) -> usize {
        self.crawl_calls.load(Ordering::SeqCst)
    }

    pub fn soft_crawl_calls(&self) -> usize {
        self.soft_crawl_calls.load(Ordering::SeqCst)
    }

    /// Every operation, of any kind.
    pub fn calls(&self) -> usize {
        self.cache_calls() + self.crawl_calls() + self.soft_crawl_calls()
    }

    /// Body every crawl of `url` returns.
    pub fn crawled_body(&self, url: &str) -> String {
        format!("<html>{} crawled {url}</html>", self.name)
    }

    fn check(&self) -> Result<()> {
        match &self.failure {
            Some(kind) => exn::bail!(kind.clone()),
            None => Ok(()),
        }
    }

    fn crawled(&self, url: &str) -> Capture {
        Capture::success(url, UtcDateTime::now(), self.crawled_body(url))
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn cache_with(&self, query: &CacheQuery, _reverse: bool) -> Result<Option<Capture>> {
        self.cache_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let (_, key) = query.param();
        Ok(self.archive.read().await.get(key).cloned())
    }

    async fn crawl(&self, url: &str) -> Result<Capture> {
        self.crawl_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.crawled(url))
    }

    fn supports_soft_crawl(&self) -> bool {
        self.soft_crawl
    }

    async fn soft_crawl(&self, url: &str) -> Result<Capture> {
        self.soft_crawl_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let archived = self.archive.read().await.get(url).cloned();
        Ok(archived.unwrap_or_else(|| self.crawled(url)))
    }
}
