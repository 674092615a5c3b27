//! Length-prefixed body frames.

use crate::Compression;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tracing::instrument;

/// Size of the big-endian uncompressed-length prefix.
pub const FRAME_PREFIX_LEN: usize = 4;

/// Most memory reserved up front from a prefix, which is only a claim until
/// the payload agrees with it.
const PREALLOC_LIMIT: usize = 16 * 1024 * 1024;

impl Compression {
    /// Compress `input` into a frame: the uncompressed length as a big-endian
    /// `u32`, followed by the compressed payload.
    ///
    /// Only self-describing formats can be framed, since the reader picks the
    /// decoder from the payload's magic bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use hermes_compress::{Compression, unframe};
    ///
    /// let frame = Compression::Zlib.frame(b"<html></html>").unwrap();
    /// assert_eq!(&frame[..4], &[0, 0, 0, 13]);
    /// assert_eq!(unframe(&frame).unwrap(), b"<html></html>");
    /// ```
    #[instrument(level = "debug", skip(input), fields(format = %self, input_size = input.len()))]
    pub fn frame(&self, input: &[u8]) -> Result<Vec<u8>> {
        if !self.is_self_describing() {
            exn::bail!(ErrorKind::UnsupportedFormat(self.to_string()));
        }
        let length = u32::try_from(input.len()).or_raise(|| ErrorKind::Oversized(input.len()))?;
        let mut output = Vec::with_capacity(FRAME_PREFIX_LEN + input.len() / 4);
        output.extend_from_slice(&length.to_be_bytes());
        self.compress_into(input, &mut output)?;
        Ok(output)
    }
}

/// Decompress a frame written by [`Compression::frame`], validating that the
/// decompressed size matches the recorded prefix.
///
/// A mismatch is reported as [`ErrorKind::LengthMismatch`] and the partial
/// content is discarded; a short read is never returned as if it were whole.
/// Decompression stops one byte past the prefix, so for an oversized payload
/// `actual` is `expected + 1`.
#[instrument(level = "debug", skip(frame), fields(frame_size = frame.len()))]
pub fn unframe(frame: &[u8]) -> Result<Vec<u8>> {
    let Some((prefix, payload)) = frame.split_first_chunk::<FRAME_PREFIX_LEN>() else {
        exn::bail!(ErrorKind::Truncated(frame.len()));
    };
    let expected = u32::from_be_bytes(*prefix) as usize;
    let format = Compression::from_magic_bytes(payload);
    if !format.is_self_describing() {
        exn::bail!(ErrorKind::InvalidData);
    }
    let mut output = Vec::with_capacity(expected.min(PREALLOC_LIMIT));
    let actual = format.decompress_bounded(payload, expected as u64 + 1, &mut output)?;
    if actual != expected {
        exn::bail!(ErrorKind::LengthMismatch { expected, actual });
    }
    Ok(output)
}
