//! UAX Ingest
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Collects analytics raw-data exports and loads them into PostgreSQL.
//!
//! - [`export`]: remote export API client and the wait-until-ready loop
//! - [`staging`]: staging directory cleanup and dated backups
//! - [`ingest`]: NDJSON parsing and row mapping
//! - [`store`]: row sink and job checkpoint store (PostgreSQL or in memory)
//! - [`pipeline`]: the checkpointed collector and the download-only exporter

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod pipeline;
pub mod schema;
pub mod staging;
pub mod store;

pub use error::{IngestError, Result};
