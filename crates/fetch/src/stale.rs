use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use hermes_canon::AliasPattern;
use hermes_store::{FetchRecord, Filter, Repository};

/// Replay mode: fetches are answered from the store alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleMode {
    /// Pretend no record newer than this ID exists.
    pub before_id: Option<i64>,
}
impl StaleMode {
    /// The tighter of this mode's cutoff and `before_id`.
    pub fn bound(&self, before_id: Option<i64>) -> Option<i64> {
        match (self.before_id, before_id) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Newest successful record for a canonical URL (or alias pattern), without
/// any network access.
pub(crate) async fn lookup(
    repo: &Repository,
    url: &str,
    alias: Option<&AliasPattern>,
    before_id: Option<i64>,
) -> Result<FetchRecord> {
    let filter = Filter::default().with_before_id(before_id);
    let record = match alias {
        Some(pattern) => repo.most_recent_like(pattern, filter).await,
        None => repo.most_recent(url, filter).await,
    }
    .or_raise(|| ErrorKind::Store)?;
    tracing::debug!(url, found = record.is_some(), ?before_id, "Stale lookup");
    record.ok_or_raise(|| ErrorKind::NoSuchCachedRecord(url.to_string()))
}
