//! Remote export client
//!
//! Job lifecycle: `Requested -> Pending* -> Completed -> Fetched`. Result
//! files are only fetched once the job has been seen as completed.

pub mod client;
pub mod poll;
pub mod types;

pub use client::ExportClient;
pub use poll::{wait_for, PollPolicy};
pub use types::{
    ExportFormat, ExportJobHandle, ExportJobRequest, ExportJobStatus, FetchSummary,
    ResultFileDescriptor,
};
