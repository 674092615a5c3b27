use crate::Compression;
use crate::error::{Error, ErrorKind};
use std::str::FromStr;

const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
// Compression method 8 (deflate) in the low nibble of the CMF byte.
const ZLIB_DEFLATE: u8 = 0x08;

impl FromStr for Compression {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "zlib" | "deflate" => Ok(Compression::Zlib),
            "gz" | "gzip" => Ok(Compression::Gzip),
            "bz2" | "bzip2" => Ok(Compression::Bzip2),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}
impl From<&[u8]> for Compression {
    fn from(value: &[u8]) -> Self {
        Compression::from_magic_bytes(value)
    }
}
impl Compression {
    /// Detect compression format from magic bytes.
    ///
    /// Returns `None` variant if no magic bytes match or if the input
    /// is too short to detect any format.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Compression::Bzip2;
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Compression::Gzip;
        }
        if is_zlib_header(bytes) {
            return Compression::Zlib;
        }
        Compression::None
    }
}

/// Zlib has no fixed magic number; the two header bytes are a deflate
/// method/window byte and a flag byte chosen so that the pair is a multiple of 31.
fn is_zlib_header(bytes: &[u8]) -> bool {
    let [cmf, flg, ..] = bytes else {
        return false;
    };
    cmf & 0x0F == ZLIB_DEFLATE && cmf >> 4 <= 7 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0
}
