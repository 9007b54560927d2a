//! Command line interface

use crate::config::{CollectConfig, ExportConfig};
use crate::error::IngestError;
use crate::pipeline::{Collector, Exporter};
use crate::schema::DatasetKind;
use crate::store::PgStore;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uax_common::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "uax-ingest")]
#[command(author, version, about = "Analytics raw-data export collector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export every dataset since the last checkpoint and load it into PostgreSQL
    Collect {
        /// JSON configuration file
        config: PathBuf,
    },

    /// Download one dataset for a date range without ingesting it
    Export {
        /// JSON configuration file
        config: PathBuf,

        /// First day of the range (YYYY-MM-DD)
        start_date: NaiveDate,

        /// Last day of the range (YYYY-MM-DD)
        end_date: NaiveDate,

        /// Dataset to export
        #[arg(long, value_enum, default_value_t = DatasetKind::Custom)]
        dataset: DatasetKind,
    },
}

impl Cli {
    /// Logging defaults implied by the flags; environment variables still win
    pub fn log_config(&self) -> LogConfig {
        let level = if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };

        LogConfig::builder()
            .level(level)
            .log_file_prefix("uax-ingest")
            .build()
    }
}

async fn connect_store(config: &CollectConfig) -> Result<PgStore> {
    let store = PgStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    store
        .ensure_schema()
        .await
        .context("Failed to create destination tables")?;
    Ok(store)
}

/// Execute one subcommand to completion
pub async fn run(command: Command, cancel: CancellationToken) -> Result<()> {
    match command {
        Command::Collect { config } => {
            let config = CollectConfig::load(&config)?;

            // setup has no side effects worth finishing, so an interrupt drops it
            let store = tokio::select! {
                _ = cancel.cancelled() => return Err(IngestError::Cancelled.into()),
                store = connect_store(&config) => Arc::new(store?),
            };

            let collector = Collector::new(&config, store.clone(), store, cancel)?;
            let report = collector.run().await?;
            info!(rows = report.total_rows(), "Collect finished");
        },
        Command::Export {
            config,
            start_date,
            end_date,
            dataset,
        } => {
            let config = ExportConfig::load(&config)?;

            let exporter = Exporter::new(&config, cancel)?;
            let report = exporter.run(dataset, start_date, end_date).await?;
            info!(
                job_id = %report.job_id,
                path = %report.directory.display(),
                "Export finished"
            );
        },
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_export_defaults_to_custom() {
        let cli = Cli::parse_from(["uax-ingest", "export", "cfg.json", "2024-01-01", "2024-01-31"]);
        match cli.command {
            Command::Export {
                dataset,
                start_date,
                ..
            } => {
                assert_eq!(dataset, DatasetKind::Custom);
                assert_eq!(start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_export_dataset_flag() {
        let cli = Cli::parse_from([
            "uax-ingest",
            "-v",
            "export",
            "cfg.json",
            "2024-01-01",
            "2024-01-31",
            "--dataset",
            "appStart",
        ]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Command::Export {
                dataset: DatasetKind::AppStart,
                ..
            }
        ));
        assert_eq!(cli.log_config().level, LogLevel::Debug);
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        let result = Cli::try_parse_from(["uax-ingest", "export", "cfg.json", "01/01/2024", "2024-01-31"]);
        assert!(result.is_err());
    }
}
