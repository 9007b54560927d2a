//! UAX Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the analytics export collector binaries.
//!
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Compression**: gzip helpers for downloaded export artifacts
//! - **Errors**: the error type returned by the helpers in this crate
//!
//! # Example
//!
//! ```no_run
//! use uax_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
