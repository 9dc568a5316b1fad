//! Delivery worker: claim, dispatch, record outcomes, back off, repeat.
//!
//! Each worker is an independent loop over the shared store. The claim
//! transitions a disjoint batch to `processing` atomically; dispatch runs
//! outside any transaction so a slow delivery never holds row locks; the
//! outcome writes are best-effort, with the reaper as the backstop for
//! anything left behind.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use mailroom_core::{Email, EmailId, EmailStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    mailer::{Mailer, Outcome},
    storage::QueueStorage,
};

/// Configuration for the delivery engine.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops.
    pub pool_size: usize,

    /// Maximum emails to claim per iteration.
    pub batch_size: usize,

    /// How often the reaper checks for stuck rows; also the age past
    /// which a `processing` row counts as stuck.
    pub stuck_check_interval: Duration,

    /// Backoff between worker iterations. Not a contract, just keeps an
    /// empty queue from being polled hot.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: crate::DEFAULT_POOL_SIZE,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            stuck_check_interval: Duration::from_secs(
                crate::DEFAULT_STUCK_CHECK_INTERVAL_SECONDS,
            ),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// One claim/dispatch loop instance.
pub struct Worker {
    id: usize,
    storage: Arc<dyn QueueStorage>,
    mailer: Arc<dyn Mailer>,
    batch_size: usize,
    poll_interval: Duration,
    cancellation_token: CancellationToken,
}

impl Worker {
    /// Creates a worker with the pool-wide configuration.
    pub fn new(
        id: usize,
        storage: Arc<dyn QueueStorage>,
        mailer: Arc<dyn Mailer>,
        config: &WorkerConfig,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            id,
            storage,
            mailer,
            batch_size: config.batch_size,
            poll_interval: config.poll_interval,
            cancellation_token,
        }
    }

    /// Main worker loop: claims and processes batches until cancelled.
    ///
    /// The loop is the error boundary: a failed iteration is logged and
    /// the next one starts fresh. Cancellation is observed between
    /// iterations only; an in-flight batch always finishes its outcome
    /// writes.
    pub async fn run(&self) {
        info!(worker_id = self.id, "delivery worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            if let Err(error) = self.process_batch().await {
                error!(
                    worker_id = self.id,
                    error = %error,
                    "claim failed, no work this iteration"
                );
            }

            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                () = self.cancellation_token.cancelled() => break,
            }
        }

        info!(worker_id = self.id, "delivery worker stopped");
    }

    /// Runs one iteration: claim a batch, dispatch it, write outcomes.
    ///
    /// Returns the number of claimed emails (zero when the queue was
    /// empty).
    ///
    /// # Errors
    ///
    /// Returns error only when the claim itself fails; in that case no
    /// row changed state and nothing was dispatched. Dispatch panics and
    /// outcome-write failures are contained here — affected rows stay in
    /// `processing` for the reaper.
    pub async fn process_batch(&self) -> Result<usize> {
        let batch = self.storage.claim_pending_failed(self.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let claimed = batch.len();
        debug!(worker_id = self.id, claimed, "claimed email batch");

        let partition = AssertUnwindSafe(self.dispatch(&batch)).catch_unwind().await;
        let (sent, failed) = match partition {
            Ok(partition) => partition,
            Err(panic) => {
                error!(
                    worker_id = self.id,
                    panic = panic_message(panic.as_ref()),
                    "dispatch panicked, batch left in processing for the reaper"
                );
                return Ok(claimed);
            },
        };

        for (status, ids) in [(EmailStatus::Sent, sent), (EmailStatus::Failed, failed)] {
            if ids.is_empty() {
                continue;
            }
            if let Err(error) = self.storage.batch_update_status(ids, status).await {
                warn!(
                    worker_id = self.id,
                    status = %status,
                    error = %error,
                    "outcome write failed, rows stay in processing until requeued"
                );
            }
        }

        Ok(claimed)
    }

    /// Delivers each claimed email in claim order and partitions the ids
    /// by outcome.
    async fn dispatch(&self, batch: &[Email]) -> (Vec<EmailId>, Vec<EmailId>) {
        let mut sent = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();

        for email in batch {
            let outcome = self.mailer.deliver(email).await;

            info!(
                id = email.id.0,
                addr = %email.to_address,
                from = %email.status,
                to = %outcome.status(),
                "email status change"
            );

            match outcome {
                Outcome::Sent => sent.push(email.id),
                Outcome::Failed => failed.push(email.id),
            }
        }

        (sent, failed)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
