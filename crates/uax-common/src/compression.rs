//! Gzip helpers for export artifacts
//!
//! Result files of an export job are delivered as single-member gzip streams.
//! They are small enough to be held in memory, so decompression works on
//! byte slices and the caller decides where the output goes.

use crate::error::{CommonError, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Decompress gzip-compressed data
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| CommonError::Decompression(e.to_string()))?;
    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(decompressed)
}

/// Decompress `data` and write the result to `output_path`, replacing any
/// existing file. Returns the number of decompressed bytes written.
pub fn decompress_gzip_to_file(data: &[u8], output_path: &Path) -> Result<u64> {
    let decompressed = decompress_gzip(data)?;
    std::fs::write(output_path, &decompressed)?;
    Ok(decompressed.len() as u64)
}
