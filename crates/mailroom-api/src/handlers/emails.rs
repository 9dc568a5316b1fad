//! Enqueue and list handlers for the email queue.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lettre::Address;
use mailroom_core::{EmailId, EmailStatus, NewEmail};
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::ErrorResponse;
use crate::AppState;

/// Query parameters for the list endpoint.
///
/// A non-integer `cursor` is rejected by the extractor before the
/// handler runs.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Status filter; must be one of `pending`, `sent`, `failed`.
    pub status: String,
    /// Return rows with id greater than this. Defaults to the start.
    pub cursor: Option<i64>,
}

/// Accepts a send-request and queues it for delivery.
///
/// Responds 202 with an empty body: acceptance means "durably queued",
/// not "delivered". Clients poll `GET /emails` for the outcome.
pub async fn send_email(
    State(state): State<AppState>,
    Json(params): Json<NewEmail>,
) -> Response {
    if let Err(message) = validate_send(&params) {
        warn!(error = message, "rejected send-email request");
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response();
    }

    match state.emails.create(params).await {
        Ok(email) => {
            debug!(id = email.id.0, "email queued");
            StatusCode::ACCEPTED.into_response()
        },
        Err(error) => {
            error!(error = %error, "failed to queue email");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("failed to queue email")),
            )
                .into_response()
        },
    }
}

/// Lists emails by status with cursor pagination.
pub async fn list_emails(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let status = match query.status.parse::<EmailStatus>() {
        Ok(status) if status.is_queryable() => status,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("status must be one of pending, sent, failed")),
            )
                .into_response();
        },
    };

    let cursor = EmailId(query.cursor.unwrap_or(0));

    match state.emails.list_by_status(status, state.page_size, cursor).await {
        Ok(emails) => (StatusCode::OK, Json(emails)).into_response(),
        Err(error) => {
            error!(error = %error, "failed to list emails");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("failed to list emails")),
            )
                .into_response()
        },
    }
}

fn validate_send(params: &NewEmail) -> Result<(), &'static str> {
    if params.to_address.parse::<Address>().is_err() {
        return Err("to_address must be a valid email address");
    }
    if params.subject.is_empty() {
        return Err("subject must not be empty");
    }
    if params.body.is_empty() {
        return Err("body must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(to_address: &str, subject: &str, body: &str) -> NewEmail {
        NewEmail {
            to_address: to_address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn valid_request_passes_validation() {
        assert!(validate_send(&request("user@example.com", "hi", "there")).is_ok());
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        for addr in ["invalid-email", "", "@example.com", "user@", "a b@example.com"] {
            assert!(validate_send(&request(addr, "hi", "there")).is_err(), "{addr:?}");
        }
    }

    #[test]
    fn empty_subject_or_body_is_rejected() {
        assert!(validate_send(&request("user@example.com", "", "there")).is_err());
        assert!(validate_send(&request("user@example.com", "hi", "")).is_err());
    }
}
