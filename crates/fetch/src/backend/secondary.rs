use super::client::ApiClient;
use super::{Backend, CacheQuery};
use crate::decode::Decoder;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::OptionExt;
use hermes_config::BackendConfig;
use hermes_store::Capture;

pub const SECONDARY_USER_AGENT: &str = "skitter_client/0.1.0";

/// A fallback backend with a broad historical archive.
///
/// Its cache answers exact URL lookups as well as searches, and can return
/// the oldest archived copy. `soft_crawl` is the trait default.
pub struct SecondaryBackend {
    client: ApiClient,
}

impl SecondaryBackend {
    pub fn new(config: &BackendConfig, decoder: Decoder) -> Result<Self> {
        Ok(Self { client: ApiClient::new(config, SECONDARY_USER_AGENT, decoder)? })
    }
}

#[async_trait]
impl Backend for SecondaryBackend {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn cache_with(&self, query: &CacheQuery, reverse: bool) -> Result<Option<Capture>> {
        let mut params = vec![query.param()];
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
}
