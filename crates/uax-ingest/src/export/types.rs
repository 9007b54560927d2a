//! Export API request and response types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Format of the exported records. Only newline-delimited JSON is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
}

/// One export request.
///
/// When a continuation token is present the remote service ignores the start
/// date, so it is not sent at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJobRequest {
    pub dataset_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub format: ExportFormat,
    pub continuation_token: Option<String>,
}

impl ExportJobRequest {
    pub fn new(dataset_name: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            start_date,
            end_date,
            format: ExportFormat::Json,
            continuation_token: None,
        }
    }

    pub fn continue_from(mut self, job_id: Option<String>) -> Self {
        self.continuation_token = job_id;
        self
    }

    pub(crate) fn body(&self) -> CreateExportBody<'_> {
        let (start_date, continue_from) = match &self.continuation_token {
            Some(token) => (None, Some(token.as_str())),
            None => (Some(self.start_date.format("%Y-%m-%d").to_string()), None),
        };

        CreateExportBody {
            end_date: self.end_date.format("%Y-%m-%d").to_string(),
            format: self.format,
            dataset: &self.dataset_name,
            start_date,
            continue_from,
        }
    }
}

/// Wire body of the job-creation call
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateExportBody<'a> {
    pub end_date: String,
    pub format: ExportFormat,
    pub dataset: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_from: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateExportResponse {
    pub id: String,
}

/// Identifies a running export job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJobHandle {
    job_id: String,
    dataset_name: String,
}

impl ExportJobHandle {
    pub fn new(job_id: impl Into<String>, dataset_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            dataset_name: dataset_name.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }
}

/// Status of a job as reported by a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportJobStatus {
    Pending,
    Completed,
    /// Any other reported status, or a failed poll
    Other(String),
}

impl ExportJobStatus {
    pub fn from_remote(status: &str) -> Self {
        match status {
            "completed" => ExportJobStatus::Completed,
            "pending" => ExportJobStatus::Pending,
            other => ExportJobStatus::Other(other.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExportJobStatus::Completed)
    }
}

/// One compressed artifact of a completed job
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResultFileDescriptor {
    pub url: String,
    pub name: String,
}

impl ResultFileDescriptor {
    /// Local file name: `name` without its last extension (`f.json.gz` -> `f.json`)
    pub fn local_name(&self) -> &str {
        let base = self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name);
        match base.rfind('.') {
            Some(idx) if idx > 0 => &base[..idx],
            _ => base,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JobResult {
    #[serde(rename = "fileList")]
    pub file_list: Option<Vec<ResultFileDescriptor>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobStatusResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<JobResult>,
}

/// Outcome of fetching the result files of one job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub written: Vec<std::path::PathBuf>,
    /// Names of files whose download returned a non-success status
    pub skipped: Vec<String>,
}
