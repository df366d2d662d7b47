//! Gzip wrap/unwrap for the transcript stream.
//!
//! Only the transcript entry is compressed: audio bytes arrive already
//! compressed by their codec, and the metadata record is too small to be
//! worth it. The container stores entries uncompressed, so this layer is the
//! only compression applied to transcript data.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};

/// Gzip-compress a byte stream.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::Internal(format!("gzip compression failed: {e}")))
}

/// Inverse of [`compress`].
///
/// Raises [`Error::CorruptStream`] for anything that is not a complete,
/// intact gzip stream. A missing header, a truncated member, or a failed
/// CRC all land here.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::CorruptStream(format!("gzip decompression failed: {e}")))?;
    Ok(out)
}
