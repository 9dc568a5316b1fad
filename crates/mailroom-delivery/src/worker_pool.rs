//! Worker pool lifecycle management.
//!
//! Spawns the configured worker loops plus the reaper, and owns their
//! shutdown: cancel the shared token, then join every task under a
//! timeout. Workers finish their in-flight iteration before exiting, so
//! a graceful shutdown may still leave rows in `processing` if the
//! outcome write was interrupted — the reaper requeues them on restart,
//! and that is relied upon.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{DeliveryError, Result},
    mailer::Mailer,
    reaper::StuckReaper,
    storage::QueueStorage,
    worker::{Worker, WorkerConfig},
};

/// Supervises the delivery workers and the stuck-job reaper.
pub struct WorkerPool {
    storage: Arc<dyn QueueStorage>,
    mailer: Arc<dyn Mailer>,
    config: WorkerConfig,
    cancellation_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool; nothing runs until [`WorkerPool::spawn`].
    pub fn new(
        storage: Arc<dyn QueueStorage>,
        mailer: Arc<dyn Mailer>,
        config: WorkerConfig,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { storage, mailer, config, cancellation_token, handles: Vec::new() }
    }

    /// Launches `pool_size` worker loops and one reaper loop.
    ///
    /// Returns immediately; all loops run until the cancellation token is
    /// signalled.
    pub fn spawn(&mut self) {
        info!(
            pool_size = self.config.pool_size,
            batch_size = self.config.batch_size,
            stuck_check_interval_seconds = self.config.stuck_check_interval.as_secs(),
            "spawning delivery workers"
        );

        for worker_id in 0..self.config.pool_size {
            let worker = Worker::new(
                worker_id,
                self.storage.clone(),
                self.mailer.clone(),
                &self.config,
                self.cancellation_token.clone(),
            );
            self.handles.push(tokio::spawn(async move { worker.run().await }));
        }

        let reaper = StuckReaper::new(
            self.storage.clone(),
            self.config.stuck_check_interval,
            self.cancellation_token.clone(),
        );
        self.handles.push(tokio::spawn(async move { reaper.run().await }));
    }

    /// Signals cancellation and waits for every task to finish.
    ///
    /// Worker panics are logged, not propagated; the only failure mode
    /// here is exceeding the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::ShutdownTimeout`] if tasks are still
    /// running when the timeout expires.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            task_count = self.handles.len(),
            timeout_seconds = timeout.as_secs(),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.handles);
        let join_all = async {
            for (task_id, handle) in handles.into_iter().enumerate() {
                if let Err(join_error) = handle.await {
                    if join_error.is_panic() {
                        let panic = DeliveryError::WorkerPanic {
                            task_id,
                            message: join_error.to_string(),
                        };
                        error!(error = %panic, "worker task panicked during shutdown");
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => {
                info!("worker pool shutdown completed");
                Ok(())
            },
            Err(_) => {
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "worker shutdown timed out, some tasks may still be running"
                );
                Err(DeliveryError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Whether any spawned task is still running.
    pub fn has_active_tasks(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active = self.handles.iter().filter(|handle| !handle.is_finished()).count();

        if active > 0 && !self.cancellation_token.is_cancelled() {
            warn!(
                active_tasks = active,
                "worker pool dropped without shutdown_graceful, cancelling tasks"
            );
            self.cancellation_token.cancel();
        }
    }
}
