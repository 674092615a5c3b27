//! Query surface of the fetch log.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Capture, FetchRecord, STATUS_OK, WebRow};
use exn::ResultExt;
use hermes_canon::{AliasPattern, Canonicalizer};
use hermes_compress::Compression;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

/// Which records a "most recent" lookup may return.
///
/// The default only considers successful (`200`) captures, without an upper
/// bound on the record ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    /// Required status, or `None` for any status (failure records included).
    pub status: Option<u16>,
    /// Ignore records with an ID above this one, for replaying against a
    /// frozen snapshot of the log.
    pub before_id: Option<i64>,
}
impl Default for Filter {
    fn default() -> Self {
        Self { status: Some(STATUS_OK), before_id: None }
    }
}
impl Filter {
    /// Match records of every status.
    pub fn any_status() -> Self {
        Self { status: None, before_id: None }
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    pub fn with_before_id(mut self, before_id: Option<i64>) -> Self {
        self.before_id = before_id;
        self
    }
}

/// Repository for reading and appending fetch records.
///
/// Cloning is cheap (the pool is reference counted), and a clone may be used
/// from any task: the log is append-only and concurrent appends are
/// serialized by SQLite itself, never by an in-process lock.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    canon: Canonicalizer,
    compression: Compression,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Repository {
    /// Create a new repository with the default canonicalizer, writing
    /// zlib-compressed bodies.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            canon: Canonicalizer::default(),
            compression: Compression::default(),
        }
    }

    pub fn with_canonicalizer(mut self, canon: Canonicalizer) -> Self {
        self.canon = canon;
        self
    }

    /// Codec for bodies appended from now on. Existing bodies are read back
    /// whatever codec they were written with.
    ///
    /// Formats that can't be framed (see [`Compression::is_self_describing`])
    /// fail every [`append`](Self::append) that carries a body.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canon
    }

    fn canonicalize(&self, url: &str) -> Result<String> {
        self.canon.canonicalize(url).or_raise(|| ErrorKind::InvalidUrl(url.to_string()))
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Durably append a capture to the log and return the stored record.
    ///
    /// The URL is canonicalized before it is written. Captures without a body
    /// (failed fetches) are stored too, and appending a URL that already has
    /// records never conflicts.
    #[instrument(level = "debug", skip(self, capture), fields(url = %capture.url, status = capture.status))]
    pub async fn append(&self, capture: &Capture, source: Option<&str>) -> Result<FetchRecord> {
        let url = self.canonicalize(&capture.url)?;
        let frame = capture
            .body
            .as_deref()
            .map(|body| self.compression.frame(body.as_bytes()))
            .transpose()
            .or_raise(|| ErrorKind::Compression)?;
        let id: i64 = sqlx::query_scalar(include_str!("../queries/append.sql"))
            .bind(capture.created_at.unix_timestamp())
            .bind(&url)
            .bind(i64::from(capture.status))
            .bind(frame)
            .bind(source)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(id, %url, "Appended fetch record");
        Ok(FetchRecord {
            id,
            // The log stores whole seconds.
            created_at: capture
                .created_at
                .replace_nanosecond(0)
                .or_raise(|| ErrorKind::InvalidData("created_at"))?,
            url,
            status: capture.status,
            body: capture.body.clone(),
            source: source.map(str::to_string),
        })
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Get a record by ID.
    pub async fn get(&self, id: i64) -> Result<Option<FetchRecord>> {
        let row: Option<WebRow> = sqlx::query_as(include_str!("../queries/get.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FetchRecord::try_from).transpose()
    }

    /// The highest-ID record for exactly this (canonicalized) URL.
    #[instrument(level = "debug", skip(self))]
    pub async fn most_recent(&self, url: &str, filter: Filter) -> Result<Option<FetchRecord>> {
        let url = self.canonicalize(url)?;
        let row: Option<WebRow> = sqlx::query_as(include_str!("../queries/most_recent.sql"))
            .bind(url)
            .bind(filter.status.map(i64::from))
            .bind(filter.before_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FetchRecord::try_from).transpose()
    }

    /// The highest-ID record whose URL matches the pattern.
    #[instrument(level = "debug", skip(self), fields(pattern = %pattern))]
    pub async fn most_recent_like(&self, pattern: &AliasPattern, filter: Filter) -> Result<Option<FetchRecord>> {
        let row: Option<WebRow> = sqlx::query_as(include_str!("../queries/most_recent_like.sql"))
            .bind(pattern.as_str())
            .bind(filter.status.map(i64::from))
            .bind(filter.before_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FetchRecord::try_from).transpose()
    }

    /// When the newest successful capture of this URL was made.
    pub async fn most_recent_time(&self, url: &str) -> Result<Option<time::UtcDateTime>> {
        let url = self.canonicalize(url)?;
        let created: Option<i64> = sqlx::query_scalar(include_str!("../queries/most_recent_time.sql"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        created
            .map(time::UtcDateTime::from_unix_timestamp)
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("created_at"))
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Every distinct URL with a successful capture matching the pattern,
    /// ordered by its newest capture first.
    #[instrument(level = "debug", skip(self), fields(pattern = %pattern))]
    pub async fn all_like(&self, pattern: &AliasPattern) -> Result<Vec<String>> {
        sqlx::query_scalar(include_str!("../queries/all_like.sql"))
            .bind(pattern.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// The URL of the newest successful capture matching the pattern.
    pub async fn last_like(&self, pattern: &AliasPattern) -> Result<Option<String>> {
        sqlx::query_scalar(include_str!("../queries/last_like.sql"))
            .bind(pattern.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// The URL of the newest successful capture that is either `default`
    /// itself or matches one of `patterns`; `default` (canonicalized) when
    /// there is none.
    pub async fn last_like_or_default(&self, default: &str, patterns: &[AliasPattern]) -> Result<String> {
        let default = self.canonicalize(default)?;
        let mut query = QueryBuilder::<Sqlite>::new("SELECT url FROM web WHERE status = ");
        query.push_bind(i64::from(STATUS_OK));
        query.push(" AND (url = ");
        query.push_bind(default.clone());
        for pattern in patterns {
            query.push(" OR url LIKE ");
            query.push_bind(pattern.as_str().to_string());
            query.push(r" ESCAPE '\'");
        }
        query.push(") ORDER BY id DESC LIMIT 1");
        let found: Option<String> = query
            .build_query_scalar::<String>()
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(found.unwrap_or(default))
    }

    /// Total number of records in the log.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }
}
