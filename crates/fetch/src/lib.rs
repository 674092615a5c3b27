//! Fetch modes over the response store.
//!
//! [`FetchCache`] is the one entry point callers need. It is built once at
//! start-up (usually with [`FetchCache::from_config`]) and cloned into
//! whatever task needs to fetch. It offers three modes:
//!
//! - **force** ([`FetchCache::force_fetch`]): a fresh copy, from the first
//!   backend that can produce one, optionally falling back to a direct fetch.
//! - **soft** ([`FetchCache::soft_fetch`]): the stored copy when there is one
//!   (and it isn't musty), then any backend's archive, then a fresh copy.
//! - **stale-only** ([`FetchCache::stale_only_fetch`]): the stored copy or
//!   nothing, without any network access.
//!
//! Everything fetched is appended to the store before it is returned.
//!
//! # Architecture
//! - [`backend`]: the [`Backend`](backend::Backend) trait, the primary and
//!   secondary API clients, and a mock for tests.
//! - [`DirectFetcher`]: live fetches from the origin.
//! - [`Decoder`]: bytes to text, with the windows-1252 repair path.
//! - [`polite_delay`]: randomized pauses between requests.

pub mod backend;
mod chain;
mod decode;
mod delay;
mod direct;
pub mod error;
mod stale;

pub use crate::chain::{FetchCache, FetchOptions, SoftOptions};
pub use crate::decode::Decoder;
pub use crate::delay::{MAX_POLITE_DELAY, polite_delay, polite_sleep};
pub use crate::direct::DirectFetcher;
pub use crate::stale::StaleMode;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hermes_store::Repository;

/// Canonicalize with the store's own canonicalizer, so lookups and appends agree.
fn canonicalize(repo: &Repository, url: &str) -> Result<String> {
    repo.canonicalizer()
        .canonicalize(url)
        .or_raise(|| ErrorKind::Canonicalization(url.to_string()))
}
