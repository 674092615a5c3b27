//! Live HTTP fetching into the response store.

use crate::decode::Decoder;
use crate::delay::polite_sleep;
use crate::error::{ErrorKind, Result};
use crate::stale::{self, StaleMode};
use exn::ResultExt;
use hermes_config::{CookieConfig, DirectConfig};
use hermes_store::{Capture, FetchRecord, Repository, STATUS_OK, STATUS_REQUEST_ERROR};
use reqwest::Url;
use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;
use tracing::instrument;

const REDIRECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches pages from their origin, recording every attempt.
///
/// Each request carries the configured browser user agent and cookies. Every
/// attempt appends exactly one record to the store: the decoded body on
/// `200`, an empty failure record with the response status otherwise, or
/// with [`STATUS_REQUEST_ERROR`] when no response arrived at all.
///
/// In [stale mode](StaleMode) the fetcher never touches the network and
/// answers from the store instead.
#[derive(Debug, Clone)]
pub struct DirectFetcher {
    http: reqwest::Client,
    repo: Repository,
    decoder: Decoder,
    source: Option<String>,
    stale: Option<StaleMode>,
}

impl DirectFetcher {
    pub fn new(repo: Repository, config: &DirectConfig) -> Result<Self> {
        let jar = Jar::default();
        for cookie in &config.cookies {
            add_cookie(&jar, cookie)?;
        }
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .cookie_provider(Arc::new(jar))
            .build()
            .or_raise(|| ErrorKind::Setup)?;
        Ok(Self {
            http,
            repo,
            decoder: Decoder::new(config.decode_failure_dump.clone()),
            source: None,
            stale: None,
        })
    }

    /// Tag appended records with `source`.
    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn with_stale(mut self, stale: Option<StaleMode>) -> Self {
        self.stale = stale;
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn stale(&self) -> Option<StaleMode> {
        self.stale
    }

    /// Fetch `url` now, store the attempt, then pause politely.
    ///
    /// `delay` is the politeness hint handed to
    /// [`polite_delay`](crate::polite_delay); the pause follows failed
    /// responses too, but not requests that never got one.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str, timeout: Duration, delay: f64) -> Result<FetchRecord> {
        let url = crate::canonicalize(&self.repo, url)?;
        if let Some(mode) = self.stale {
            tracing::info!(%url, "Stale mode, serving from the store");
            return stale::lookup(&self.repo, &url, None, mode.before_id).await;
        }
        let created_at = UtcDateTime::now();
        let response = match self.http.get(&url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%url, %err, "Request failed before a response");
                self.record_failure(&url, created_at, STATUS_REQUEST_ERROR).await?;
                return Err(err).or_raise(|| ErrorKind::Request);
            },
        };
        let status = response.status().as_u16();
        if status != STATUS_OK {
            tracing::warn!(%url, status, "Direct fetch failed");
            self.record_failure(&url, created_at, status).await?;
            polite_sleep(delay).await;
            exn::bail!(ErrorKind::FetchFailed { status });
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%url, %err, "Response body was cut short");
                self.record_failure(&url, created_at, STATUS_REQUEST_ERROR).await?;
                return Err(err).or_raise(|| ErrorKind::Request);
            },
        };
        let body = self.decoder.decode_or_dump(&bytes, &url).await?;
        let record = self
            .repo
            .append(&Capture::success(url.as_str(), created_at, body), self.source())
            .await
            .or_raise(|| ErrorKind::Store)?;
        tracing::info!(id = record.id, %url, size = bytes.len(), "Fetched");
        polite_sleep(delay).await;
        Ok(record)
    }

    /// Follow redirects from `url` and return where they end up.
    ///
    /// Nothing is stored. Stale mode returns the canonical URL unchanged.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_redirects(&self, url: &str) -> Result<String> {
        let url = crate::canonicalize(&self.repo, url)?;
        if self.stale.is_some() {
            return Ok(url);
        }
        let response = self
            .http
            .get(&url)
            .timeout(REDIRECT_TIMEOUT)
            .send()
            .await
            .or_raise(|| ErrorKind::Request)?;
        let resolved = response.url().to_string();
        tokio::time::sleep(Duration::from_secs_f64(2.0 * rand::random::<f64>())).await;
        Ok(resolved)
    }

    async fn record_failure(&self, url: &str, created_at: UtcDateTime, status: u16) -> Result<()> {
        self.repo
            .append(&Capture::failure(url, created_at, status), self.source())
            .await
            .or_raise(|| ErrorKind::Store)?;
        Ok(())
    }
}

fn add_cookie(jar: &Jar, cookie: &CookieConfig) -> Result<()> {
    let host = cookie.domain.trim_start_matches('.');
    let origin = Url::parse(&format!("https://{host}{}", cookie.path)).or_raise(|| ErrorKind::Setup)?;
    jar.add_cookie_str(
        &format!("{}={}; Domain={}; Path={}", cookie.name, cookie.value, cookie.domain, cookie.path),
        &origin,
    );
    Ok(())
}
