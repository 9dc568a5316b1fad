//! Core domain types and persistence for the mailroom outbound-email queue.
//!
//! Defines the `Email` entity with its four-state lifecycle (pending,
//! processing, sent, failed) and the Postgres repository layer that backs
//! it. The repository exposes the locked-batch claim primitive
//! (`FOR UPDATE SKIP LOCKED`) that lets concurrent workers share the queue
//! without any in-memory coordination.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;

pub use error::{CoreError, Result};
pub use models::{Email, EmailId, EmailStatus, NewEmail};
