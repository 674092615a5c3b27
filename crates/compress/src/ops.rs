//! Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::{Compression as BzCompression, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::Compression as FlateCompression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{Read, Write};
use tracing::instrument;

// Use the highest compression level available for the formats; archived
// bodies are written once and read rarely.
const BZIP2_LEVEL: BzCompression = BzCompression::best();
const FLATE_LEVEL: FlateCompression = FlateCompression::best();

impl Compression {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use hermes_compress::Compression;
    ///
    /// let data = b"Hello, world!";
    /// let compressed = Compression::Zlib.compress(data).unwrap();
    /// assert_ne!(compressed, data);
    /// ```
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.compress_into(input, &mut output)?;
        Ok(output)
    }

    /// Decompress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hermes_compress::Compression;
    ///
    /// let original = b"Hello, world!";
    /// let compressed = Compression::Bzip2.compress(original).unwrap();
    /// let decompressed = Compression::Bzip2.decompress(&compressed).unwrap();
    /// assert_eq!(decompressed, original);
    /// ```
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decompress_into(input, &mut output)?;
        Ok(output)
    }

    #[instrument(level = "trace", skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn compress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let start = output.len();
        match self {
            Compression::None => output.extend_from_slice(input),
            Compression::Zlib => {
                let mut encoder = ZlibEncoder::new(&mut *output, FLATE_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(&mut *output, FLATE_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            Compression::Bzip2 => {
                let mut encoder = BzEncoder::new(&mut *output, BZIP2_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
        }
        let size = output.len() - start;
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }

    pub fn decompress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        self.decompress_bounded(input, u64::MAX, output)
    }

    /// Decompress at most `limit` bytes into `output`; anything past the
    /// limit is left unread.
    #[instrument(level = "trace", skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn decompress_bounded(&self, input: &[u8], limit: u64, output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => input.take(limit).read_to_end(output),
            Compression::Zlib => ZlibDecoder::new(input).take(limit).read_to_end(output),
            Compression::Gzip => GzDecoder::new(input).take(limit).read_to_end(output),
            Compression::Bzip2 => BzDecoder::new(input).take(limit).read_to_end(output),
        }
        .or_raise(|| ErrorKind::InvalidData)?;
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }
}
