//! Compression codecs for archived response bodies.
//!
//! Response bodies are persisted as a *frame*: a 4-byte big-endian prefix
//! holding the uncompressed length, followed by the compressed payload. The
//! codec of the payload is not stored; it is recovered from the payload's
//! magic bytes when the frame is read back ([`unframe`]), which keeps frames
//! written by older deployments (always zlib) readable alongside newer ones.
//!
//! - **Codec selection** from configuration names ([`Compression::from_str`](std::str::FromStr))
//!   or magic bytes ([`Compression::from_magic_bytes`])
//! - **In-memory** compression/decompression ([`Compression::compress`],
//!   [`Compression::decompress`])
//! - **Framing** with length validation ([`Compression::frame`], [`unframe`])
//!
//! All compression uses the highest available level for each format,
//! prioritizing storage space over speed.

mod construct;
pub mod error;
mod frame;
mod ops;
#[cfg(feature = "serde")]
mod serde;
mod util;

pub use crate::frame::{FRAME_PREFIX_LEN, unframe};

/// A supported compression format.
///
/// Defaults to [`Zlib`](Self::Zlib), the format every historical frame uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    None,
    /// Zlib (RFC 1950) compression
    #[default]
    Zlib,
    /// Gzip compression
    Gzip,
    /// Bzip2 compression
    Bzip2,
}

#[cfg(test)]
mod tests {
    use crate::Compression;

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::Zlib);
    }
}
