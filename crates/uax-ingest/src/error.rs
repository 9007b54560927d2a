//! Error types for the export collector

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Configuration file is missing, unreadable or incomplete
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The export API answered with a non-success status
    #[error("Export API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A staged record could not be parsed
    #[error("Failed to parse {}:{line}: {message}", file.display())]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },

    /// A `ts`/`submit_time` value is not an epoch-millisecond number
    #[error("Invalid epoch-millisecond value for column '{column}': {value}")]
    Timestamp { column: String, value: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A destination store could not accept or serve data
    #[error("Store error: {0}")]
    Store(String),

    #[error("Wait for export job cancelled")]
    Cancelled,

    #[error("Export job {job_id} not completed after {waited:?}")]
    PollTimeout { job_id: String, waited: Duration },

    #[error(transparent)]
    Common(#[from] uax_common::CommonError),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}
