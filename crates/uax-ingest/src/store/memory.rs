//! In-process store

use super::{CheckpointEntry, CheckpointStore, RowSink};
use crate::error::{IngestError, Result};
use crate::ingest::DestinationRow;
use crate::schema::TableSchema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Rows and checkpoints held in memory, for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<&'static str, Vec<DestinationRow>>>,
    batches: Mutex<Vec<(&'static str, usize)>>,
    checkpoints: Mutex<Vec<CheckpointEntry>>,
}

/// Lock for a write or lookup; a poisoned lock is an error
fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| IngestError::Store("in-memory store lock poisoned".to_string()))
}

/// Lock for inspection, ignoring poison
fn read<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows inserted into `table`, in insertion order
    pub fn rows(&self, table: &str) -> Vec<DestinationRow> {
        read(&self.rows).get(table).cloned().unwrap_or_default()
    }

    /// `(table, row count)` of every insert call
    pub fn batches(&self) -> Vec<(&'static str, usize)> {
        read(&self.batches).clone()
    }

    pub fn checkpoints(&self) -> Vec<CheckpointEntry> {
        read(&self.checkpoints).clone()
    }
}

#[async_trait]
impl RowSink for MemoryStore {
    async fn insert_rows(
        &self,
        table: &'static TableSchema,
        rows: Vec<DestinationRow>,
    ) -> Result<u64> {
        let count = rows.len();
        let mut batches = lock(&self.batches)?;
        let mut stored = lock(&self.rows)?;
        batches.push((table.name, count));
        stored.entry(table.name).or_default().extend(rows);
        Ok(count as u64)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn find_last_job_id(&self, job_type: &str) -> Result<Option<String>> {
        let checkpoints = lock(&self.checkpoints)?;
        Ok(checkpoints
            .iter()
            .filter(|c| c.job_type == job_type)
            .max_by_key(|c| c.timestamp)
            .map(|c| c.job_id.clone()))
    }

    async fn record_checkpoint(
        &self,
        job_type: &str,
        job_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        lock(&self.checkpoints)?.push(CheckpointEntry {
            timestamp,
            job_id: job_id.to_string(),
            job_type: job_type.to_string(),
        });
        Ok(())
    }
}
