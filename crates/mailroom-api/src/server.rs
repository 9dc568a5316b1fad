//! HTTP server setup and graceful shutdown.
//!
//! Axum router with request tracing and timeout layers. The server stops
//! accepting connections on SIGINT/SIGTERM and drains in-flight requests
//! before returning.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    routing::{get, post},
    Router,
};
use mailroom_core::storage::Storage;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Config, handlers, service::StorageEmailService, AppState};

/// Creates the router with all routes and middleware.
pub fn create_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/send-email", post(handlers::send_email))
        .route("/emails", get(handlers::list_emails))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.server_read_header_timeout)))
        .layer(TraceLayer::new_for_http())
}

/// Starts the HTTP server and serves until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an I/O error if the port cannot be bound or the listener
/// fails.
pub async fn start_server(
    storage: Arc<Storage>,
    config: &Config,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let state = AppState::new(
        Arc::new(StorageEmailService::new(storage)),
        config.server_page_size,
    );
    let app = create_router(state, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for CTRL+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("received SIGTERM, starting graceful shutdown");
        },
    }
}
