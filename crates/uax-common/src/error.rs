//! Error types shared by the UAX crates

use thiserror::Error;

/// Result type alias for common helpers
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload was not a valid single-member gzip stream
    #[error("Decompression error: {0}")]
    Decompression(String),
}
