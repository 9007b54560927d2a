//! Destination store
//!
//! The pipeline writes through two seams: [`RowSink`] for dataset rows and
//! [`CheckpointStore`] for the append-only job checkpoints. [`PgStore`] backs
//! both with PostgreSQL; [`MemoryStore`] keeps everything in process.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::ingest::DestinationRow;
use crate::schema::TableSchema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One appended checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub timestamp: DateTime<Utc>,
    pub job_id: String,
    pub job_type: String,
}

/// Bulk row insertion into a destination table
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Insert all `rows` as one operation; either every row lands or none.
    async fn insert_rows(&self, table: &'static TableSchema, rows: Vec<DestinationRow>)
        -> Result<u64>;
}

/// Last processed job per job type
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Job id of the newest entry for `job_type`
    async fn find_last_job_id(&self, job_type: &str) -> Result<Option<String>>;

    /// Append an entry. Existing entries are never modified.
    async fn record_checkpoint(
        &self,
        job_type: &str,
        job_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;
}
