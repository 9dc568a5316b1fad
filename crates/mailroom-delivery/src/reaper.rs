//! Stuck-job reaper.
//!
//! A worker that dies between claiming and writing outcomes leaves its
//! batch in `processing` forever. The reaper is the recovery path: on a
//! fixed interval it returns every `processing` row older than the
//! threshold to `pending`, where the next claim picks it up. The
//! threshold equals the interval, so one knob bounds both how often we
//! look and how long a row may sit orphaned.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{error::Result, storage::QueueStorage};

/// Periodic loop returning orphaned `processing` rows to `pending`.
pub struct StuckReaper {
    storage: Arc<dyn QueueStorage>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl StuckReaper {
    /// Creates a reaper checking every `interval`, with the same value as
    /// the stuck threshold.
    pub fn new(
        storage: Arc<dyn QueueStorage>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { storage, interval, cancellation_token }
    }

    /// Runs the reaper loop until cancelled.
    ///
    /// Errors are confined to a single tick; the loop keeps going.
    pub async fn run(&self) {
        info!(interval_seconds = self.interval.as_secs(), "stuck-email reaper starting");

        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = self.cancellation_token.cancelled() => break,
            }

            match self.run_once().await {
                Ok(0) => {},
                Ok(requeued) => info!(requeued, "requeued stuck emails"),
                Err(error) => error!(error = %error, "failed to requeue stuck emails"),
            }
        }

        info!("stuck-email reaper stopped");
    }

    /// Applies a single reaper pass and returns how many rows moved.
    ///
    /// Rows whose `updated_at` is within the threshold are never touched;
    /// anything older goes back to `pending`.
    ///
    /// # Errors
    ///
    /// Returns error if the store update fails.
    pub async fn run_once(&self) -> Result<u64> {
        Ok(self.storage.mark_stuck_as_pending(self.interval).await?)
    }
}
