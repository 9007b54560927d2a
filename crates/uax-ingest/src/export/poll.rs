//! Wait-until-ready primitive for export jobs
//!
//! The check is called until it reports ready, sleeping a fixed interval
//! between calls on the tokio clock. There is no backoff. The wait can be
//! cancelled through a [`CancellationToken`] and optionally bounded by a
//! timeout; without one it waits indefinitely.

use crate::config::DEFAULT_POLL_INTERVAL_SECS;
use crate::error::{IngestError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: None,
        }
    }
}

/// Call `check` until it returns `Ok(true)`.
///
/// Returns the number of check calls. Check errors are returned immediately.
/// `label` only identifies the wait in errors and logs.
pub async fn wait_for<F, Fut>(
    label: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        attempts += 1;
        if check().await? {
            return Ok(attempts);
        }

        let waited = started.elapsed();
        if let Some(timeout) = policy.timeout {
            if waited + policy.interval > timeout {
                return Err(IngestError::PollTimeout {
                    job_id: label.to_string(),
                    waited,
                });
            }
        }

        debug!(label, attempts, waited_secs = waited.as_secs(), "Not ready yet");

        tokio::select! {
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {},
        }
    }
}
