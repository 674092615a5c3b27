//! Fetch Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Store, canonicalization and
//! configuration errors stay attached as children of the kind raised here.

use derive_more::{Display, Error};

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The URL has no usable `scheme://` form.
    #[display("malformed URL: {_0}")]
    Canonicalization(#[error(not(source))] String),
    /// Every decoding fallback failed. The raw bytes were dumped for
    /// inspection; never retry, never substitute.
    #[display("could not decode response body of {url}")]
    Decode { url: String },
    /// A live request got a non-success status (already recorded).
    #[display("direct fetch failed with status {status}")]
    FetchFailed { status: u16 },
    /// A backend answered with something other than success or not-found,
    /// after any rate-limit retries.
    #[display("backend request failed with status {status}")]
    BackendRequestFailed { status: u16 },
    /// Stale-only mode found nothing to serve.
    #[display("no cached record for {_0}")]
    NoSuchCachedRecord(#[error(not(source))] String),
    /// The whole chain, and the direct fallback when enabled, failed.
    #[display("all backends failed for {_0}")]
    AllBackendsFailed(#[error(not(source))] String),
    /// No backends are configured for an operation that needs one.
    #[display("no backends configured")]
    NoBackends,
    /// The request never produced a response (connect, TLS, timeout, body read).
    #[display("request error")]
    Request,
    /// A backend response is missing or has a malformed metadata header.
    #[display("invalid backend response: {_0}")]
    InvalidResponse(#[error(not(source))] &'static str),
    /// The backend can't answer this kind of request.
    #[display("unsupported backend request: {_0}")]
    Unsupported(#[error(not(source))] &'static str),
    /// Reading from or appending to the response store failed.
    #[display("response store error")]
    Store,
    /// Building an HTTP client or the fetch context failed.
    #[display("could not set up fetching")]
    Setup,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request => true,
            Self::FetchFailed { status } | Self::BackendRequestFailed { status } => {
                *status == 429 || *status >= 500
            },
            _ => false,
        }
    }

    /// Whether the error must abort the whole fetch instead of moving on to
    /// the next source: content that can't be decoded, or a store that can't
    /// be read or written.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Request, true)]
    #[case(ErrorKind::BackendRequestFailed { status: 429 }, true)]
    #[case(ErrorKind::BackendRequestFailed { status: 503 }, true)]
    #[case(ErrorKind::FetchFailed { status: 404 }, false)]
    #[case(ErrorKind::Decode { url: "https://example.com".to_string() }, false)]
    #[case(ErrorKind::NoSuchCachedRecord("https://example.com".to_string()), false)]
    fn test_is_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }
}
