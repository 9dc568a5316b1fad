//! Database access layer for the email queue.
//!
//! All SQL lives in the repositories under this module; nothing outside
//! it touches the database directly. The repository owns the on-disk
//! representation, callers only see domain types.

use std::sync::Arc;

use sqlx::PgPool;

pub mod emails;

use crate::error::Result;

/// Container for repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for email queue operations.
    pub emails: Arc<emails::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self { emails: Arc::new(emails::Repository::new(pool)) }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.emails.pool()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Lazy pool creation does not touch the network; real queries are
        // exercised through the delivery crate's storage seam.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
