//! Response body decoding.
//!
//! Bodies are UTF-8 most of the time. Older archives serve windows-1252, often
//! with UTF-8 fragments (headers, footers, a pasted quote) spliced in, and a
//! few documents are corrupted beyond that. [`Decoder::decode`] repairs the
//! known damage, then decodes as windows-1252, and refuses to guess when that
//! still fails: a replacement character written to the archive is permanent.

use crate::error::{ErrorKind, Result};
use encoding_rs::WINDOWS_1252;
use std::path::{Path, PathBuf};

type Substitution = (&'static [u8], &'static [u8]);

/// Byte patches for individual historical documents.
const DOCUMENT_PATCHES: &[Substitution] = &[
    // "Mórrigan" and "façade", double encoded (fictionalley galatea05).
    (b"M\xc3\x83\xc2\xb3rr\xc3\x83\xc2\xadgan", b"M\xf3rrigan"),
    (b"fa\xc3\x83\xc2\xa7ade", b"fa\xe7ade"),
    // Mangled runs of dash entities.
    (b"#8211;&#8212;&#8211;\xb5&#8211;\xbb&#8211;\xb8", b"#8211;&#8212;&#8211;&#8211;&#8211;"),
    (b"#8211;&#8211;&#8211;\xb9 &#8211; &#8212;\x83", b"#8211;&#8211;&#8211; &#8211; &#8212;"),
    (b"&#8211;\xb9 &#8211; &#8212;\x83", b"#8211;&#8211;&#8211; &#8211; &#8212;&#8"),
];

/// UTF-8 sequences inside a windows-1252 document, mapped to the
/// windows-1252 byte for the same character.
const UTF8_TO_CP1252: &[Substitution] = &[
    (b"\xc2\xa9", b"\xa9"),         // ©
    (b"\xc2\xb0", b"\xb0"),         // °
    (b"\xc3\xa1", b"\xe1"),         // á
    (b"\xc3\xa7", b"\xe7"),         // ç
    (b"\xc3\xa8", b"\xe8"),         // è
    (b"\xc3\xa9", b"\xe9"),         // é
    (b"\xc3\xa0", b"\xe0"),         // à
    (b"\xe2\x80\xa6", b"\x85"),     // …
    (b"\xe2\x80\x93", b"\x96"),     // –
    (b"\xe2\x80\x99", b"\x92"),     // ’
    (b"\xe2\x80\x9c", b"\x93"),     // “
    (b"\xe2\x80\x9d", b"\x94"),     // ”
    (b"\xef\xbf\xbd", b"\x81"),     // U+FFFD, dropped below
];

/// Normalization of the remaining windows-1252: plain quotes and dashes,
/// invisible characters removed.
const CP1252_MUNGE: &[Substitution] = &[
    (b"\x81", b""),
    (b"\x91", b"'"),
    (b"\x92", b"'"),
    (b"\x93", b"\""),
    (b"\x94", b"\""),
    (b"\x96", b"-"),
    (b"\x97", b"-"),
    (b"\x9d", b""),
    (b"\xa0", b" "),
    (b"\xad", b""),
];

/// Bytes windows-1252 leaves unassigned. `encoding_rs` follows the WHATWG
/// table, which maps them to C1 controls instead of failing.
const CP1252_UNDEFINED: &[u8] = &[0x81, 0x8d, 0x8f, 0x90, 0x9d];

/// Converts response bytes to text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoder {
    dump_path: Option<PathBuf>,
}

impl Decoder {
    /// A decoder that writes undecodable bodies to `dump_path` (overwriting
    /// the previous dump), or nowhere when `None`.
    pub fn new(dump_path: Option<PathBuf>) -> Self {
        Self { dump_path }
    }

    pub fn dump_path(&self) -> Option<&Path> {
        self.dump_path.as_deref()
    }

    /// Decode a response body fetched from `url`.
    ///
    /// Raises [`ErrorKind::Decode`] when neither UTF-8 nor the repaired
    /// windows-1252 interpretation is valid. Nothing is written anywhere;
    /// fetchers use [`decode_or_dump`](Self::decode_or_dump).
    pub fn decode(&self, bytes: &[u8], url: &str) -> Result<String> {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok(text.to_string());
        }
        match decode_cp1252(&repair(bytes)) {
            Some(text) => {
                tracing::debug!(url, "Decoded body through the windows-1252 fallback");
                Ok(text)
            },
            None => exn::bail!(ErrorKind::Decode { url: url.to_string() }),
        }
    }

    /// [`decode`](Self::decode), writing the repaired bytes to the dump file
    /// when decoding fails.
    pub async fn decode_or_dump(&self, bytes: &[u8], url: &str) -> Result<String> {
        let err = match self.decode(bytes, url) {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };
        match &self.dump_path {
            Some(path) => match tokio::fs::write(path, repair(bytes)).await {
                Ok(()) => tracing::error!(url, dump = %path.display(), "Could not decode response body"),
                Err(io) => tracing::error!(url, dump = %path.display(), err = %io, "Could not decode response body, nor dump it"),
            },
            None => tracing::error!(url, "Could not decode response body"),
        }
        Err(err)
    }
}

fn repair(bytes: &[u8]) -> Vec<u8> {
    DOCUMENT_PATCHES
        .iter()
        .chain(UTF8_TO_CP1252)
        .chain(CP1252_MUNGE)
        .fold(bytes.to_vec(), |data, (from, to)| replace_all(&data, from, to))
}

fn decode_cp1252(bytes: &[u8]) -> Option<String> {
    if bytes.iter().any(|b| CP1252_UNDEFINED.contains(b)) {
        return None;
    }
    WINDOWS_1252
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

/// Replace every non-overlapping occurrence of `from`, scanning left to right.
fn replace_all(haystack: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = rest.windows(from.len()).position(|window| window == from) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(to);
        rest = &rest[pos + from.len()..];
    }
    out.extend_from_slice(rest);
    out
}
