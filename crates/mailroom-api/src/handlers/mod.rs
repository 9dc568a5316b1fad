//! HTTP request handlers.

pub mod emails;
pub mod health;

pub use emails::{list_emails, send_email};
pub use health::health_check;

use serde::Serialize;

/// JSON error body returned on 4xx/5xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error description.
    pub error: String,
}

impl ErrorResponse {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}
