//! Run orchestration
//!
//! [`Collector`] drives the checkpointed cycle for every dataset:
//!
//! 1. look up the previous job id for the dataset
//! 2. request an export of the trailing window, continuing from that job
//! 3. wait for completion
//! 4. fetch and decompress into the staging directory
//! 5. back the staged files up (when a backup root is configured)
//! 6. ingest the staged files
//! 7. clear the staging directory
//! 8. append a checkpoint with the new job id
//!
//! Datasets run one after another and the first error aborts the run. An
//! interrupt is honoured between steps; once a dataset's rows are inserted its
//! checkpoint is still recorded, so the next run does not load them twice.
//! [`Exporter`] only performs steps 2 to 4 for a single dataset and an
//! explicit date range.

use crate::config::{CollectConfig, ExportConfig};
use crate::error::{IngestError, Result};
use crate::export::{ExportClient, ExportJobRequest, FetchSummary, PollPolicy};
use crate::ingest::ingest;
use crate::schema::DatasetKind;
use crate::staging;
use crate::store::{CheckpointStore, RowSink};
use chrono::{Days, Local, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of one dataset cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetReport {
    pub dataset: DatasetKind,
    pub job_id: String,
    pub polls: u32,
    pub files_fetched: usize,
    pub files_skipped: usize,
    pub rows_inserted: u64,
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectReport {
    pub datasets: Vec<DatasetReport>,
    pub duration_seconds: f64,
}

impl CollectReport {
    pub fn total_rows(&self) -> u64 {
        self.datasets.iter().map(|d| d.rows_inserted).sum()
    }
}

/// Checkpointed collector
pub struct Collector {
    client: ExportClient,
    sink: Arc<dyn RowSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    staging_dir: PathBuf,
    backup_root: Option<PathBuf>,
    lookback_days: u32,
    poll: PollPolicy,
    cancel: CancellationToken,
}

impl Collector {
    pub fn new(
        config: &CollectConfig,
        sink: Arc<dyn RowSink>,
        checkpoints: Arc<dyn CheckpointStore>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let client = ExportClient::new(config.remote.clone())?;

        Ok(Self {
            client,
            sink,
            checkpoints,
            staging_dir: config.collection_path.clone(),
            backup_root: config.backup_path.clone(),
            lookback_days: config.lookback_days,
            poll: config.poll.policy(),
            cancel,
        })
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok(())
    }

    /// Run every dataset, using the local calendar date as "today"
    pub async fn run(&self) -> Result<CollectReport> {
        self.run_on(Local::now().date_naive()).await
    }

    /// Run every dataset with an explicit "today"
    pub async fn run_on(&self, today: NaiveDate) -> Result<CollectReport> {
        self.ensure_not_cancelled()?;
        let started = Instant::now();

        // leftovers of an interrupted run must not be ingested twice
        std::fs::create_dir_all(&self.staging_dir)?;
        let stale = staging::clear_directory(&self.staging_dir)?;
        if stale > 0 {
            warn!(files = stale, path = %self.staging_dir.display(), "Removed stale staged files");
        }

        let mut datasets = Vec::with_capacity(DatasetKind::ALL.len());
        for dataset in DatasetKind::ALL {
            datasets.push(self.process_dataset(dataset, today).await?);
        }

        let report = CollectReport {
            datasets,
            duration_seconds: started.elapsed().as_secs_f64(),
        };

        info!(
            datasets = report.datasets.len(),
            rows = report.total_rows(),
            duration_secs = format!("{:.2}", report.duration_seconds),
            "Collection complete"
        );
        Ok(report)
    }

    /// One full cycle for `dataset`
    pub async fn process_dataset(
        &self,
        dataset: DatasetKind,
        today: NaiveDate,
    ) -> Result<DatasetReport> {
        // no new remote job once an interrupt has been received
        self.ensure_not_cancelled()?;

        let job_type = dataset.as_str();
        info!(dataset = job_type, "Processing dataset");

        let previous = self.checkpoints.find_last_job_id(job_type).await?;
        let start = today
            .checked_sub_days(Days::new(u64::from(self.lookback_days)))
            .ok_or_else(|| {
                IngestError::config(format!("lookback_days out of range: {}", self.lookback_days))
            })?;

        let request = ExportJobRequest::new(job_type, start, today).continue_from(previous);
        let handle = self.client.request_export(&request).await?;

        let polls = self
            .client
            .wait_until_complete(&handle, &self.poll, &self.cancel)
            .await?;

        self.ensure_not_cancelled()?;
        let fetched = self
            .client
            .fetch_and_unpack(&handle, &self.staging_dir)
            .await?;

        let backup_dir = match &self.backup_root {
            Some(root) => staging::backup(job_type, &self.staging_dir, root, today)?,
            None => None,
        };

        self.ensure_not_cancelled()?;
        let ingested = ingest(dataset.table(), &self.staging_dir, self.sink.as_ref()).await?;
        staging::clear_directory(&self.staging_dir)?;

        self.checkpoints
            .record_checkpoint(job_type, handle.job_id(), Utc::now())
            .await?;

        info!(
            dataset = job_type,
            job_id = handle.job_id(),
            files = ingested.files,
            rows = ingested.rows,
            "Dataset complete"
        );

        Ok(DatasetReport {
            dataset,
            job_id: handle.job_id().to_string(),
            polls,
            files_fetched: fetched.written.len(),
            files_skipped: fetched.skipped.len(),
            rows_inserted: ingested.rows,
            backup_dir,
        })
    }
}

/// Outcome of a download-only export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub job_id: String,
    pub directory: PathBuf,
    pub files: FetchSummary,
}

/// Download-only exporter
pub struct Exporter {
    client: ExportClient,
    collection_path: PathBuf,
    poll: PollPolicy,
    cancel: CancellationToken,
}

impl Exporter {
    pub fn new(config: &ExportConfig, cancel: CancellationToken) -> Result<Self> {
        Ok(Self {
            client: ExportClient::new(config.remote.clone())?,
            collection_path: config.collection_path.clone(),
            poll: config.poll.policy(),
            cancel,
        })
    }

    /// `<collection_path>/<start>_<end>`
    pub fn target_dir(&self, start: NaiveDate, end: NaiveDate) -> PathBuf {
        self.collection_path.join(format!(
            "{}_{}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ))
    }

    pub async fn run(
        &self,
        dataset: DatasetKind,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ExportReport> {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let request = ExportJobRequest::new(dataset.as_str(), start, end);
        let handle = self.client.request_export(&request).await?;

        self.client
            .wait_until_complete(&handle, &self.poll, &self.cancel)
            .await?;
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let directory = self.target_dir(start, end);
        let files = self.client.fetch_and_unpack(&handle, &directory).await?;

        info!(
            dataset = dataset.as_str(),
            job_id = handle.job_id(),
            files = files.written.len(),
            path = %directory.display(),
            "Export downloaded"
        );

        Ok(ExportReport {
            job_id: handle.job_id().to_string(),
            directory,
            files,
        })
    }
}
