//! Self-describing payload encoding for the distributed tier.
//!
//! Payloads at or below the threshold are stored as plain JSON. Larger
//! payloads are gzip-compressed, base64-encoded and prefixed with
//! [`COMPRESSED_TAG`]. JSON text can never start with that tag, so
//! [`decode`] always knows which form it is looking at regardless of the
//! threshold the writer used.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::CacheError;

/// Marks a gzip + base64 payload.
pub const COMPRESSED_TAG: &str = "z1:";

/// Encode `payload`, compressing it when it is longer than `threshold` bytes.
pub fn encode(payload: &str, threshold: usize) -> Result<String, CacheError> {
    if payload.len() <= threshold {
        return Ok(payload.to_owned());
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(payload.as_bytes())
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CacheError::Compression(e.to_string()))?;

    let mut out = String::with_capacity(COMPRESSED_TAG.len() + compressed.len() * 4 / 3 + 4);
    out.push_str(COMPRESSED_TAG);
    STANDARD.encode_string(compressed, &mut out);
    Ok(out)
}

/// Decode a payload produced by [`encode`] (or written untagged by anyone).
pub fn decode(raw: &str) -> Result<String, CacheError> {
    let Some(body) = raw.strip_prefix(COMPRESSED_TAG) else {
        return Ok(raw.to_owned());
    };

    let compressed = STANDARD
        .decode(body)
        .map_err(|e| CacheError::Compression(format!("invalid base64: {e}")))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut out = String::new();
    decoder
        .read_to_string(&mut out)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    Ok(out)
}

/// Whether `raw` carries the compression tag.
pub fn is_compressed(raw: &str) -> bool {
    raw.starts_with(COMPRESSED_TAG)
}
