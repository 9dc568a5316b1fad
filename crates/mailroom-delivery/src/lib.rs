//! Email delivery engine: worker pool and stuck-job reaper.
//!
//! Workers claim disjoint batches from PostgreSQL with `FOR UPDATE SKIP
//! LOCKED`, dispatch them through a pluggable [`Mailer`], and write the
//! outcomes back. A single reaper loop returns rows orphaned in
//! `processing` (a worker died mid-dispatch) to `pending`.
//!
//! ```text
//!                        ┌────────────────────────────────┐
//!                        │           PostgreSQL           │
//!                        │          emails table          │
//!                        │     FOR UPDATE SKIP LOCKED     │
//!                        └────────────────────────────────┘
//!                              │         │         │
//!                        disjoint claims (no blocking)
//!                              │         │         │
//!                        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!                        │ Worker 1 │ │ Worker 2 │ │ Worker N │   + reaper
//!                        └──────────┘ └──────────┘ └──────────┘
//! ```
//!
//! There is no shared in-memory queue and no leader election: the claim
//! transaction is the only synchronisation. Locks are held for two short
//! statements, never across dispatch, so one slow delivery cannot block
//! other workers' claims.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mailer;
pub mod reaper;
pub mod storage;
pub mod worker;
pub mod worker_pool;

pub use error::{DeliveryError, Result};
pub use mailer::{FnMailer, Mailer, Outcome, SimulatedMailer};
pub use reaper::StuckReaper;
pub use storage::{PostgresQueueStorage, QueueStorage};
pub use worker::{Worker, WorkerConfig};
pub use worker_pool::WorkerPool;

/// Default number of concurrent delivery workers.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default batch size for claiming emails from the database.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default stuck-check interval (doubles as the stuck threshold).
pub const DEFAULT_STUCK_CHECK_INTERVAL_SECONDS: u64 = 30;
