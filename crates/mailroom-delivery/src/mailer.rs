//! Outbound delivery abstraction.
//!
//! Delivery is a pure decision over one email: it either went out or it
//! did not. Everything transport-specific (SMTP handshakes, provider
//! APIs, their timeouts and retry policies) belongs behind the [`Mailer`]
//! trait, not in the worker core. This repo ships a simulated transport.

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use mailroom_core::{Email, EmailStatus};

/// Final outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered; the row becomes `sent`.
    Sent,
    /// Not delivered; the row becomes `failed` and stays claimable.
    Failed,
}

impl Outcome {
    /// The email status this outcome maps to.
    pub fn status(self) -> EmailStatus {
        match self {
            Self::Sent => EmailStatus::Sent,
            Self::Failed => EmailStatus::Failed,
        }
    }
}

/// Transport seam the worker dispatches through.
pub trait Mailer: Send + Sync + 'static {
    /// Attempts delivery of one email and reports the outcome.
    ///
    /// A returned [`Outcome::Failed`] is a normal outcome, not an error:
    /// the row goes back into the claimable set.
    fn deliver<'a>(&'a self, email: &'a Email)
        -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;
}

/// Adapter turning a plain function into a [`Mailer`].
///
/// Tests inject outcome functions this way, e.g.
/// `FnMailer(|email: &Email| Outcome::Sent)`.
pub struct FnMailer<F>(pub F);

impl<F> Mailer for FnMailer<F>
where
    F: Fn(&Email) -> Outcome + Send + Sync + 'static,
{
    fn deliver<'a>(
        &'a self,
        email: &'a Email,
    ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>> {
        let outcome = (self.0)(email);
        Box::pin(std::future::ready(outcome))
    }
}

/// Stand-in transport: a small constant latency, then every second
/// delivery fails.
///
/// Keeps both outcome paths continuously exercised end to end without a
/// real SMTP dependency.
pub struct SimulatedMailer {
    latency: Duration,
    deliveries: AtomicU64,
}

impl SimulatedMailer {
    /// Creates a simulated mailer with the default latency.
    pub fn new() -> Self {
        Self { latency: Duration::from_micros(200), deliveries: AtomicU64::new(0) }
    }
}

impl Default for SimulatedMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailer for SimulatedMailer {
    fn deliver<'a>(
        &'a self,
        _email: &'a Email,
    ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;

            let n = self.deliveries.fetch_add(1, Ordering::Relaxed);
            if n % 2 == 0 {
                Outcome::Sent
            } else {
                Outcome::Failed
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mailroom_core::EmailId;

    use super::*;

    fn email(id: i64) -> Email {
        Email {
            id: EmailId(id),
            to_address: format!("user{id}@example.com"),
            subject: "hello".into(),
            body: "world".into(),
            status: EmailStatus::Pending,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn outcome_maps_to_terminal_status() {
        assert_eq!(Outcome::Sent.status(), EmailStatus::Sent);
        assert_eq!(Outcome::Failed.status(), EmailStatus::Failed);
    }

    #[tokio::test]
    async fn simulated_mailer_fails_every_second_delivery() {
        let mailer = SimulatedMailer::new();
        let email = email(1);

        let outcomes = [
            mailer.deliver(&email).await,
            mailer.deliver(&email).await,
            mailer.deliver(&email).await,
            mailer.deliver(&email).await,
        ];

        assert_eq!(outcomes, [Outcome::Sent, Outcome::Failed, Outcome::Sent, Outcome::Failed]);
    }

    #[tokio::test]
    async fn fn_mailer_applies_the_function() {
        let mailer = FnMailer(|email: &Email| {
            if email.id.0 % 2 == 0 {
                Outcome::Failed
            } else {
                Outcome::Sent
            }
        });

        assert_eq!(mailer.deliver(&email(1)).await, Outcome::Sent);
        assert_eq!(mailer.deliver(&email(2)).await, Outcome::Failed);
    }
}
