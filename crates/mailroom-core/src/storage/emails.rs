//! Repository for email queue database operations.
//!
//! Carries the persistence contract the worker pool depends on: the
//! locked-batch claim (`FOR UPDATE SKIP LOCKED` inside a transaction),
//! batch status writes that refresh `updated_at`, and the single-statement
//! stuck-row requeue used by the reaper.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Email, EmailId, EmailStatus, NewEmail},
};

/// Repository for email queue database operations.
///
/// Transaction-scoped operations are associated functions taking the
/// transaction handle, so they compose inside
/// [`Repository::with_transaction`] closures.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a new email in `pending` and returns the persisted row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or a constraint is violated.
    pub async fn create(&self, email: &NewEmail) -> Result<Email> {
        let created = sqlx::query_as::<_, Email>(
            r"
            INSERT INTO emails (to_address, subject, body)
            VALUES ($1, $2, $3)
            RETURNING id, to_address, subject, body, status, updated_at
            ",
        )
        .bind(&email.to_address)
        .bind(&email.subject)
        .bind(&email.body)
        .fetch_one(&*self.pool)
        .await?;

        Ok(created)
    }

    /// Returns up to `limit` emails with the given status and `id` greater
    /// than `cursor`, ascending by id.
    ///
    /// Read-API only; workers go through the claim path instead.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list_by_status(
        &self,
        status: EmailStatus,
        limit: i64,
        cursor: EmailId,
    ) -> Result<Vec<Email>> {
        let emails = sqlx::query_as::<_, Email>(
            r"
            SELECT id, to_address, subject, body, status, updated_at
            FROM emails
            WHERE status = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            ",
        )
        .bind(status.to_string())
        .bind(cursor)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(emails)
    }

    /// Runs `f` inside a transaction: commit on `Ok`, rollback on `Err`.
    ///
    /// A panic unwinds through this function and the open transaction
    /// rolls back when it is dropped.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a database error from
    /// begin/commit/rollback.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Transaction<'static, Postgres>) -> BoxFuture<'t, Result<T>>
            + Send,
    {
        let mut tx = self.pool.begin().await?;

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            },
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            },
        }
    }

    /// Selects up to `batch_size` claimable rows and row-locks them.
    ///
    /// Rows in `pending` or `failed` are eligible. `SKIP LOCKED` makes
    /// concurrent claims return disjoint sets: rows locked by another
    /// worker's uncommitted claim are invisible here. Rows come back in
    /// id order; an empty queue yields an empty vec.
    ///
    /// The locks are held by `tx`, so callers must flip the rows to
    /// `processing` with [`Repository::batch_update_status_in_tx`] before
    /// committing.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn lock_pending_failed(
        tx: &mut Transaction<'static, Postgres>,
        batch_size: i64,
    ) -> Result<Vec<Email>> {
        let emails = sqlx::query_as::<_, Email>(
            r"
            SELECT id, to_address, subject, body, status, updated_at
            FROM emails
            WHERE status IN ('pending', 'failed')
            ORDER BY id
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            ",
        )
        .bind(batch_size)
        .fetch_all(&mut **tx)
        .await?;

        Ok(emails)
    }

    /// Sets `status` and refreshes `updated_at` for every listed id.
    ///
    /// No-op for an empty id set. Safe outside the claim transaction;
    /// workers use it for outcome writes after dispatch.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn batch_update_status(&self, ids: &[EmailId], status: EmailStatus) -> Result<()> {
        update_status_where(&*self.pool, ids, status).await
    }

    /// Batch status update within an existing transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn batch_update_status_in_tx(
        tx: &mut Transaction<'static, Postgres>,
        ids: &[EmailId],
        status: EmailStatus,
    ) -> Result<()> {
        update_status_where(&mut **tx, ids, status).await
    }

    /// Claims a batch for processing: lock eligible rows, mark them
    /// `processing`, commit, return them.
    ///
    /// This is the worker pool's entry point. The transaction is the only
    /// synchronisation between workers; locks are held for two short
    /// statements and never across dispatch. Returned rows carry their
    /// pre-claim status.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction or either statement fails; the
    /// claim rolls back and no row changes state.
    pub async fn claim_pending_failed(&self, batch_size: usize) -> Result<Vec<Email>> {
        let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);

        self.with_transaction(move |tx| {
            Box::pin(async move {
                let emails = Self::lock_pending_failed(tx, limit).await?;
                if emails.is_empty() {
                    return Ok(emails);
                }

                let ids: Vec<EmailId> = emails.iter().map(|email| email.id).collect();
                Self::batch_update_status_in_tx(tx, &ids, EmailStatus::Processing).await?;

                Ok(emails)
            })
        })
        .await
    }

    /// Returns long-stuck `processing` rows to `pending` in one statement.
    ///
    /// A row counts as stuck when its `updated_at` is more than `seconds`
    /// old; rows inside the window are never touched. Returns the number
    /// of requeued rows.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_stuck_as_pending(&self, seconds: i64) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE emails
            SET status = 'pending', updated_at = NOW()
            WHERE status = 'processing'
              AND updated_at < NOW() - ($1 * INTERVAL '1 second')
            ",
        )
        .bind(seconds)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn update_status_where<'e, E>(executor: E, ids: &[EmailId], status: EmailStatus) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    if ids.is_empty() {
        return Ok(());
    }

    let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();

    sqlx::query(
        r"
        UPDATE emails
        SET status = $1, updated_at = NOW()
        WHERE id = ANY($2)
        ",
    )
    .bind(status.to_string())
    .bind(&raw_ids)
    .execute(executor)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _repo = Repository::new(Arc::new(pool));
    }
}
