//! HTTP client for the analytics raw-data export API
//!
//! Three remote calls are wrapped: create an export job, read a job's status,
//! and download a result file. Job calls authenticate with HTTP basic auth
//! (project id / API key); result file URLs are pre-signed and fetched without
//! credentials.

use super::poll::{wait_for, PollPolicy};
use super::types::{
    CreateExportResponse, ExportJobHandle, ExportJobRequest, ExportJobStatus, FetchSummary,
    JobStatusResponse,
};
use crate::config::RemoteConfig;
use crate::error::{IngestError, Result};
use reqwest::{Client, Response};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uax_common::compression::decompress_gzip_to_file;

/// Client for one remote project
pub struct ExportClient {
    client: Client,
    config: RemoteConfig,
}

impl ExportClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(concat!("uax-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.api_base_url
    }

    fn exports_url(&self) -> String {
        format!(
            "{}/api/v2/projects/{}/rawdataexports",
            self.config.api_base_url, self.config.project_id
        )
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.exports_url(), job_id)
    }

    async fn get_job(&self, handle: &ExportJobHandle) -> Result<Response> {
        let response = self
            .client
            .get(self.job_url(handle.job_id()))
            .basic_auth(&self.config.project_id, Some(&self.config.api_key))
            .send()
            .await?;
        Ok(response)
    }

    /// Start an export job.
    ///
    /// A non-success response is an [`IngestError::Api`]; there is no job to
    /// poll in that case.
    pub async fn request_export(&self, request: &ExportJobRequest) -> Result<ExportJobHandle> {
        let response = self
            .client
            .post(self.exports_url())
            .basic_auth(&self.config.project_id, Some(&self.config.api_key))
            .json(&request.body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateExportResponse = response.json().await?;
        info!(
            job_id = %created.id,
            dataset = %request.dataset_name,
            continue_from = request.continuation_token.as_deref().unwrap_or("-"),
            "Started export job"
        );

        Ok(ExportJobHandle::new(created.id, request.dataset_name.clone()))
    }

    /// Read the job status once.
    ///
    /// A non-success HTTP status is reported as [`ExportJobStatus::Other`], so
    /// callers treat it like a job that is not ready yet.
    pub async fn poll_status(&self, handle: &ExportJobHandle) -> Result<ExportJobStatus> {
        let response = self.get_job(handle).await?;

        let status = response.status();
        if !status.is_success() {
            warn!(job_id = handle.job_id(), status = status.as_u16(), "Status poll failed");
            return Ok(ExportJobStatus::Other(format!("http {}", status.as_u16())));
        }

        let body: JobStatusResponse = response.json().await?;
        Ok(ExportJobStatus::from_remote(&body.status))
    }

    /// Poll until the job reports `completed`. Returns the number of polls.
    pub async fn wait_until_complete(
        &self,
        handle: &ExportJobHandle,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<u32> {
        let polls = wait_for(handle.job_id(), policy, cancel, || async {
            let status = self.poll_status(handle).await?;
            Ok::<_, IngestError>(status.is_completed())
        })
        .await?;

        info!(
            job_id = handle.job_id(),
            dataset = handle.dataset_name(),
            polls,
            "Export job completed"
        );
        Ok(polls)
    }

    /// Download and decompress every result file of a completed job into
    /// `destination_dir`.
    ///
    /// If the job cannot be read, is not completed, or lists no files, this
    /// logs why and returns an empty summary. Files whose download returns a
    /// non-success status are skipped; the rest of the batch continues.
    pub async fn fetch_and_unpack(
        &self,
        handle: &ExportJobHandle,
        destination_dir: &Path,
    ) -> Result<FetchSummary> {
        std::fs::create_dir_all(destination_dir)?;

        let mut summary = FetchSummary::default();

        let response = self.get_job(handle).await?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                job_id = handle.job_id(),
                status = status.as_u16(),
                url = %self.job_url(handle.job_id()),
                "Unable to retrieve job result"
            );
            return Ok(summary);
        }

        let job: JobStatusResponse = response.json().await?;
        if !ExportJobStatus::from_remote(&job.status).is_completed() {
            warn!(job_id = handle.job_id(), status = %job.status, "Job not completed, cannot fetch results yet");
            return Ok(summary);
        }

        let Some(files) = job.result.and_then(|r| r.file_list) else {
            warn!(job_id = handle.job_id(), "No files for job");
            return Ok(summary);
        };

        for file in files {
            let response = self.client.get(&file.url).send().await?;
            if !response.status().is_success() {
                warn!(
                    job_id = handle.job_id(),
                    file = %file.name,
                    status = response.status().as_u16(),
                    "Skipping result file"
                );
                summary.skipped.push(file.name);
                continue;
            }

            let compressed = response.bytes().await?;
            let output = destination_dir.join(file.local_name());
            let written = decompress_gzip_to_file(&compressed, &output)?;
            debug!(file = %output.display(), bytes = written, "Unpacked result file");
            summary.written.push(output);
        }

        info!(
            job_id = handle.job_id(),
            dataset = handle.dataset_name(),
            written = summary.written.len(),
            skipped = summary.skipped.len(),
            path = %destination_dir.display(),
            "Saved job results"
        );
        Ok(summary)
    }
}
