//! Health probe.

use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use tracing::error;

use crate::AppState;

/// Reports service liveness and store connectivity.
pub async fn health_check(State(state): State<AppState>) -> Response {
    match state.emails.health().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response(),
        Err(err) => {
            error!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response()
        },
    }
}
