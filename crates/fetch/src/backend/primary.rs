use super::client::ApiClient;
use super::{Backend, CacheQuery};
use crate::decode::Decoder;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::OptionExt;
use hermes_config::BackendConfig;
use hermes_store::Capture;

pub const PRIMARY_USER_AGENT: &str = "weaver_client/0.1.0";

/// The preferred backend: native `softCrawl`, archive searched by query only.
pub struct PrimaryBackend {
    client: ApiClient,
}

impl PrimaryBackend {
    pub fn new(config: &BackendConfig, decoder: Decoder) -> Result<Self> {
        Ok(Self { client: ApiClient::new(config, PRIMARY_USER_AGENT, decoder)? })
    }
}

#[async_trait]
impl Backend for PrimaryBackend {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn cache_with(&self, query: &CacheQuery, reverse: bool) -> Result<Option<Capture>> {
        let CacheQuery::Query(query) = query else {
            exn::bail!(ErrorKind::Unsupported("exact URL lookups"));
        };
        let mut params = vec![("q", query.as_str())];
        if reverse {
            params.push(("r", "1"));
        }
        self.client.request("v0/cache", &params).await
    }

    async fn crawl(&self, url: &str) -> Result<Capture> {
        self.client
            .request("v0/crawl", &[("q", url)])
            .await?
            .ok_or_raise(|| ErrorKind::BackendRequestFailed { status: 404 })
    }

    fn supports_soft_crawl(&self) -> bool {
        true
    }

    async fn soft_crawl(&self, url: &str) -> Result<Capture> {
        self.client
            .request("v0/softCrawl", &[("q", url)])
            .await?
            .ok_or_raise(|| ErrorKind::BackendRequestFailed { status: 404 })
    }
}
