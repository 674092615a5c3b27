//! Canonicalization Error Types

use derive_more::{Display, Error};

/// A canonicalization error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for canonicalization operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input has no `scheme://` separator (or an empty scheme).
    #[display("malformed URL: {_0}")]
    MalformedUrl(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The same input will always canonicalize the same way.
        false
    }
}
