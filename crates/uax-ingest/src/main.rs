//! UAX Ingest - analytics export collector

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uax_common::logging::init_logging;
use uax_ingest::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    // Environment variables take precedence over the flag defaults
    let log_config = cli.log_config().merge_env()?;
    init_logging(&log_config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    // a failure is reported once, on stderr, by the returned error
    run(cli.command, cancel).await?;

    info!("Done");
    Ok(())
}
