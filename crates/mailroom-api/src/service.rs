//! Service seam between HTTP handlers and the store.
//!
//! Handlers depend on this trait rather than on the concrete repository,
//! so API tests run against an in-memory double while production wires
//! in [`StorageEmailService`].

use std::{future::Future, pin::Pin, sync::Arc};

use mailroom_core::{error::Result, storage::Storage, Email, EmailId, EmailStatus, NewEmail};

/// Email operations the ingress layer needs.
pub trait EmailService: Send + Sync + 'static {
    /// Persists a new email in `pending` and returns the stored row.
    fn create(&self, email: NewEmail)
        -> Pin<Box<dyn Future<Output = Result<Email>> + Send + '_>>;

    /// Lists up to `limit` emails with the given status and id greater
    /// than `cursor`, ascending by id.
    fn list_by_status(
        &self,
        status: EmailStatus,
        limit: i64,
        cursor: EmailId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Email>>> + Send + '_>>;

    /// Checks that the backing store is reachable.
    fn health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production service backed by the Postgres repository.
pub struct StorageEmailService {
    storage: Arc<Storage>,
}

impl StorageEmailService {
    /// Creates a service over the shared storage.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl EmailService for StorageEmailService {
    fn create(
        &self,
        email: NewEmail,
    ) -> Pin<Box<dyn Future<Output = Result<Email>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.emails.create(&email).await })
    }

    fn list_by_status(
        &self,
        status: EmailStatus,
        limit: i64,
        cursor: EmailId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Email>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.emails.list_by_status(status, limit, cursor).await })
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.health_check().await })
    }
}
