//! Storage abstraction layer for the delivery engine.
//!
//! Trait-based seam over the queue operations workers and the reaper
//! need. Production goes through `mailroom_core::storage::Storage`;
//! tests drive the engine against the in-memory mock for deterministic
//! behavior validation without a database.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use mailroom_core::{error::Result, Email, EmailId, EmailStatus};

/// Queue operations required by the worker pool and reaper.
pub trait QueueStorage: Send + Sync + 'static {
    /// Claims a batch of `pending`/`failed` emails for processing.
    ///
    /// The claim is atomic: selected rows are marked `processing` before
    /// this returns, and concurrent claims never see the same row
    /// (production uses `FOR UPDATE SKIP LOCKED` inside one transaction).
    /// Returns the rows with their pre-claim status, in id order; empty
    /// when nothing is claimable.
    fn claim_pending_failed(
        &self,
        batch_size: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Email>>> + Send + '_>>;

    /// Sets `status` and refreshes `updated_at` for the listed ids.
    ///
    /// Used for outcome writes after dispatch, outside any claim
    /// transaction. No-op for an empty id set.
    fn batch_update_status(
        &self,
        ids: Vec<EmailId>,
        status: EmailStatus,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Requeues `processing` rows older than `threshold` back to
    /// `pending`, returning how many moved.
    fn mark_stuck_as_pending(
        &self,
        threshold: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>>;
}

/// Production storage implementation backed by PostgreSQL.
pub struct PostgresQueueStorage {
    storage: Arc<mailroom_core::storage::Storage>,
}

impl PostgresQueueStorage {
    /// Creates a new PostgreSQL storage adapter.
    pub fn new(storage: Arc<mailroom_core::storage::Storage>) -> Self {
        Self { storage }
    }
}

impl QueueStorage for PostgresQueueStorage {
    fn claim_pending_failed(
        &self,
        batch_size: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Email>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.emails.claim_pending_failed(batch_size).await })
    }

    fn batch_update_status(
        &self,
        ids: Vec<EmailId>,
        status: EmailStatus,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.emails.batch_update_status(&ids, status).await })
    }

    fn mark_stuck_as_pending(
        &self,
        threshold: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        let storage = self.storage.clone();
        let seconds = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);
        Box::pin(async move { storage.emails.mark_stuck_as_pending(seconds).await })
    }
}

pub mod mock {
    //! In-memory queue storage for testing the delivery engine.
    //!
    //! Claims are serialised through one mutex, so concurrent workers get
    //! disjoint batches exactly like the SKIP LOCKED path. The mock
    //! records every claim set and outcome write for assertions and
    //! supports injecting storage failures.

    use std::collections::{BTreeMap, VecDeque};

    use chrono::{DateTime, Utc};
    use mailroom_core::CoreError;
    use tokio::sync::Mutex;

    use super::{Arc, Duration, Email, EmailId, EmailStatus, Future, Pin, QueueStorage, Result};

    #[derive(Default)]
    struct MockState {
        rows: BTreeMap<i64, Email>,
        next_id: i64,
        claim_calls: usize,
        claim_sets: Vec<Vec<EmailId>>,
        outcome_writes: Vec<(EmailStatus, Vec<EmailId>)>,
        update_calls: usize,
        claim_errors: VecDeque<String>,
        update_errors: VecDeque<String>,
    }

    /// Mock queue storage with scriptable failures and call recording.
    #[derive(Default)]
    pub struct MockQueueStorage {
        state: Arc<Mutex<MockState>>,
    }

    impl MockQueueStorage {
        /// Creates an empty mock store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Inserts a row with the given status, assigning the next id.
        pub async fn insert(&self, to_address: &str, status: EmailStatus) -> EmailId {
            self.insert_aged(to_address, status, Utc::now()).await
        }

        /// Inserts a row with an explicit `updated_at`, for aging rows
        /// past the reaper threshold.
        pub async fn insert_aged(
            &self,
            to_address: &str,
            status: EmailStatus,
            updated_at: DateTime<Utc>,
        ) -> EmailId {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = EmailId(state.next_id);
            state.rows.insert(
                id.0,
                Email {
                    id,
                    to_address: to_address.to_string(),
                    subject: "subject".to_string(),
                    body: "body".to_string(),
                    status,
                    updated_at,
                },
            );
            id
        }

        /// Queues an error for one upcoming claim call.
        pub async fn inject_claim_error(&self, message: &str) {
            self.state.lock().await.claim_errors.push_back(message.to_string());
        }

        /// Queues an error for one upcoming outcome write.
        pub async fn inject_update_error(&self, message: &str) {
            self.state.lock().await.update_errors.push_back(message.to_string());
        }

        /// Current status of a row.
        pub async fn status_of(&self, id: EmailId) -> Option<EmailStatus> {
            self.state.lock().await.rows.get(&id.0).map(|email| email.status)
        }

        /// Number of rows currently in `status`.
        pub async fn count_in(&self, status: EmailStatus) -> usize {
            self.state.lock().await.rows.values().filter(|email| email.status == status).count()
        }

        /// Whether every row reached `sent` or `failed`.
        pub async fn all_terminal(&self) -> bool {
            self.state
                .lock()
                .await
                .rows
                .values()
                .all(|email| matches!(email.status, EmailStatus::Sent | EmailStatus::Failed))
        }

        /// Total number of claim calls, including empty and failed ones.
        pub async fn claim_calls(&self) -> usize {
            self.state.lock().await.claim_calls
        }

        /// Every non-empty claimed id set, in claim order.
        pub async fn claim_sets(&self) -> Vec<Vec<EmailId>> {
            self.state.lock().await.claim_sets.clone()
        }

        /// Every successful outcome write, in order.
        pub async fn outcome_writes(&self) -> Vec<(EmailStatus, Vec<EmailId>)> {
            self.state.lock().await.outcome_writes.clone()
        }

        /// Total number of outcome-write attempts, including failed ones.
        pub async fn update_calls(&self) -> usize {
            self.state.lock().await.update_calls
        }
    }

    impl QueueStorage for MockQueueStorage {
        fn claim_pending_failed(
            &self,
            batch_size: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Email>>> + Send + '_>> {
            let state = self.state.clone();
            Box::pin(async move {
                let mut state = state.lock().await;
                state.claim_calls += 1;

                if let Some(message) = state.claim_errors.pop_front() {
                    return Err(CoreError::Database(message));
                }

                let ids: Vec<i64> = state
                    .rows
                    .values()
                    .filter(|email| {
                        matches!(email.status, EmailStatus::Pending | EmailStatus::Failed)
                    })
                    .take(batch_size)
                    .map(|email| email.id.0)
                    .collect();

                let mut claimed = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(row) = state.rows.get_mut(&id) {
                        claimed.push(row.clone());
                        row.status = EmailStatus::Processing;
                        row.updated_at = Utc::now();
                    }
                }

                if !claimed.is_empty() {
                    state.claim_sets.push(claimed.iter().map(|email| email.id).collect());
                }

                Ok(claimed)
            })
        }

        fn batch_update_status(
            &self,
            ids: Vec<EmailId>,
            status: EmailStatus,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let state = self.state.clone();
            Box::pin(async move {
                let mut state = state.lock().await;
                state.update_calls += 1;

                if let Some(message) = state.update_errors.pop_front() {
                    return Err(CoreError::Database(message));
                }

                for id in &ids {
                    if let Some(row) = state.rows.get_mut(&id.0) {
                        row.status = status;
                        row.updated_at = Utc::now();
                    }
                }
                state.outcome_writes.push((status, ids));

                Ok(())
            })
        }

        fn mark_stuck_as_pending(
            &self,
            threshold: Duration,
        ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
            let state = self.state.clone();
            Box::pin(async move {
                let cutoff =
                    Utc::now() - chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);

                let mut state = state.lock().await;
                let mut moved = 0;
                for row in state.rows.values_mut() {
                    if row.status == EmailStatus::Processing && row.updated_at < cutoff {
                        row.status = EmailStatus::Pending;
                        row.updated_at = Utc::now();
                        moved += 1;
                    }
                }

                Ok(moved)
            })
        }
    }
}
