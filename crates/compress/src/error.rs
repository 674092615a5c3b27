//! Compression Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A compression error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for compression operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Data is corrupt or malformed. Don't retry with the same input. Used for reading/decoding.
    #[display("invalid or corrupted data")]
    InvalidData,
    /// A frame is shorter than its own length prefix.
    #[display("truncated frame ({_0} bytes)")]
    Truncated(#[error(not(source))] usize),
    /// A frame decompressed to a different size than its prefix recorded.
    #[display("frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// The input is too large to be described by a frame prefix.
    #[display("input too large to frame: {_0} bytes")]
    Oversized(#[error(not(source))] usize),
    /// The requested format is not supported (for this operation).
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// An I/O operation failed. Used for writing/encoding.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }

    /// Returns `true` if the error means stored data can no longer be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, ErrorKind::InvalidData | ErrorKind::Truncated(_) | ErrorKind::LengthMismatch { .. })
    }
}
