use crate::decode::Decoder;
use crate::delay::polite_sleep;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use hermes_config::BackendConfig;
use hermes_store::Capture;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use time::UtcDateTime;
use tokio::time::Instant;
use tracing::instrument;

/// Original URL of the page a backend returned.
pub(crate) const HEADER_URL: &str = "X-Weaver-Url";
/// When the backend fetched the page (unix seconds).
pub(crate) const HEADER_CREATED: &str = "X-Weaver-Created";
/// Status the backend got from the origin, when it differs from ours.
pub(crate) const HEADER_STATUS: &str = "X-Weaver-Status";

const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// HTTP plumbing shared by every backend API.
pub(crate) struct ApiClient {
    name: String,
    base_url: Url,
    api_key: String,
    username: String,
    password: String,
    timeout: Duration,
    delay: f64,
    http: reqwest::Client,
    decoder: Decoder,
}

impl ApiClient {
    pub(crate) fn new(config: &BackendConfig, user_agent: &str, decoder: Decoder) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url).or_raise(|| ErrorKind::Setup)?;
        // Endpoints resolve below the base, never beside it.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .or_raise(|| ErrorKind::Setup)?;
        Ok(Self {
            name: config.name.clone(),
            base_url,
            api_key: config.api_key.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.timeout(),
            delay: config.delay_secs(),
            http,
            decoder,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Call an endpoint until it answers with something other than `429`.
    ///
    /// `Retry-After` is honoured for as long as the client's timeout budget
    /// allows; a wait that would end past the budget gives up immediately and
    /// surfaces the `429`. Not-found is `Ok(None)`.
    #[instrument(level = "debug", skip(self), fields(backend = %self.name))]
    pub(crate) async fn request(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Option<Capture>> {
        let api_url = self.base_url.join(endpoint).or_raise(|| ErrorKind::Setup)?;
        let started = Instant::now();
        let response = loop {
            let remaining = self.timeout.saturating_sub(started.elapsed()).max(MIN_REQUEST_TIMEOUT);
            let response = self
                .http
                .get(api_url.clone())
                .query(params)
                .form(&[("apiKey", self.api_key.as_str())])
                .basic_auth(&self.username, Some(&self.password))
                .timeout(remaining)
                .send()
                .await
                .or_raise(|| ErrorKind::Request)?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                break response;
            }
            let retry_after = retry_after(response.headers())?;
            if started.elapsed() + retry_after >= self.timeout {
                tracing::warn!(?retry_after, timeout = ?self.timeout, "Rate limited past the timeout budget");
                break response;
            }
            tracing::info!(?retry_after, "Rate limited, waiting to retry");
            tokio::time::sleep(retry_after).await;
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status != StatusCode::OK {
            exn::bail!(ErrorKind::BackendRequestFailed { status: status.as_u16() });
        }
        let headers = response.headers();
        let url = header(headers, HEADER_URL)?.to_string();
        let created = header(headers, HEADER_CREATED)?
            .parse::<i64>()
            .ok()
            .and_then(|secs| UtcDateTime::from_unix_timestamp(secs).ok())
            .ok_or_raise(|| ErrorKind::InvalidResponse(HEADER_CREATED))?;
        let origin_status = match headers.get(HEADER_STATUS) {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|value| value.trim().parse::<u16>().ok())
                .ok_or_raise(|| ErrorKind::InvalidResponse(HEADER_STATUS))?,
            None => status.as_u16(),
        };
        let bytes = response.bytes().await.or_raise(|| ErrorKind::Request)?;
        let body = self.decoder.decode_or_dump(&bytes, &url).await?;
        tracing::debug!(%url, status = origin_status, size = bytes.len(), "Backend answered");
        polite_sleep(self.delay).await;
        Ok(Some(Capture { url, created_at: created, status: origin_status, body: Some(body) }))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .ok_or_raise(|| ErrorKind::InvalidResponse(name))
}

fn retry_after(headers: &HeaderMap) -> Result<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .ok_or_raise(|| ErrorKind::InvalidResponse("Retry-After"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    #[rstest]
    #[case(Some("5"), Some(5))]
    #[case(Some(" 0 "), Some(0))]
    #[case(Some("Wed, 21 Oct 2015 07:28:00 GMT"), None)]
    #[case(None, None)]
    fn test_retry_after(#[case] value: Option<&'static str>, #[case] expected: Option<u64>) {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(value));
        }
        match expected {
            Some(secs) => assert_eq!(retry_after(&headers).unwrap(), Duration::from_secs(secs)),
            None => assert_eq!(*retry_after(&headers).unwrap_err(), ErrorKind::InvalidResponse("Retry-After")),
        }
    }

    #[rstest]
    #[case("https://primary.example/weaver/", "https://primary.example/weaver/v0/cache")]
    #[case("https://primary.example/weaver", "https://primary.example/weaver/v0/cache")]
    #[case("http://127.0.0.1:8080", "http://127.0.0.1:8080/v0/cache")]
    fn test_endpoint_resolution(#[case] base_url: &str, #[case] expected: &str) {
        let config = BackendConfig {
            name: "test".to_string(),
            kind: Default::default(),
            base_url: base_url.to_string(),
            api_key: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: None,
            delay_secs: None,
        };
        let client = ApiClient::new(&config, "test/0.0.0", Decoder::default()).unwrap();
        assert_eq!(client.base_url.join("v0/cache").unwrap().as_str(), expected);
    }
}
