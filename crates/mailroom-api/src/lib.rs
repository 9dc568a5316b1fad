//! HTTP ingress for the mailroom outbound-email queue.
//!
//! Thin by design: two routes (enqueue a send-request, list emails by
//! status) plus a health probe. Handlers talk to the store through the
//! [`service::EmailService`] seam and never see worker internals; a
//! client observes delivery progress only by polling the list API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

pub mod config;
pub mod handlers;
pub mod server;
pub mod service;

pub use config::Config;
pub use server::{create_router, start_server};
pub use service::{EmailService, StorageEmailService};

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Queue operations behind the service seam.
    pub emails: Arc<dyn EmailService>,
    /// Page size for the list API.
    pub page_size: i64,
}

impl AppState {
    /// Creates handler state over an email service.
    pub fn new(emails: Arc<dyn EmailService>, page_size: i64) -> Self {
        Self { emails, page_size }
    }
}
