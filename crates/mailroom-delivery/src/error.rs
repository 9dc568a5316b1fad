//! Error types for delivery engine operations.
//!
//! Worker iterations contain their own errors (log and continue), so this
//! taxonomy is small: storage failures surfaced inside an iteration, and
//! the two ways shutdown can go wrong.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for the delivery engine.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Underlying store operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] mailroom_core::CoreError),

    /// A worker task panicked and was reaped during shutdown.
    #[error("worker task {task_id} panicked: {message}")]
    WorkerPanic {
        /// Index of the panicked task within the pool.
        task_id: usize,
        /// Panic payload rendered as text.
        message: String,
    },

    /// Workers did not finish within the shutdown timeout.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_convert_from_core() {
        let core = mailroom_core::CoreError::Database("connection reset".into());
        let err: DeliveryError = core.into();
        assert_eq!(err.to_string(), "storage error: database error: connection reset");
    }
}
