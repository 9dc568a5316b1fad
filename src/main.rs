//! Mailroom outbound-email queue service.
//!
//! Main entry point: initializes tracing, loads configuration, connects
//! the database, then runs the HTTP ingress and the delivery worker pool
//! side by side until a shutdown signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use mailroom_api::Config;
use mailroom_core::storage::Storage;
use mailroom_delivery::{PostgresQueueStorage, SimulatedMailer, WorkerPool};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting mailroom outbound-email queue service");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        server_port = config.server_port,
        worker_pool_size = config.worker_pool_size,
        worker_batch_size = config.worker_batch_size,
        "configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    run_migrations(&db_pool).await?;
    info!("database migrations completed");

    let storage = Arc::new(Storage::new(db_pool.clone()));

    // Workers and reaper share one cancellation token, signalled by the
    // pool on shutdown; the HTTP server has its own signal-driven
    // graceful shutdown.
    let mut worker_pool = WorkerPool::new(
        Arc::new(PostgresQueueStorage::new(storage.clone())),
        Arc::new(SimulatedMailer::new()),
        config.to_worker_config(),
        CancellationToken::new(),
    );
    worker_pool.spawn();

    let addr = config.parse_server_addr()?;
    let server_handle = tokio::spawn({
        let storage = storage.clone();
        let config = config.clone();
        async move {
            if let Err(e) = mailroom_api::start_server(storage, &config, addr).await {
                error!(error = %e, "HTTP server failed");
            }
        }
    });

    info!(%addr, "mailroom is ready to accept send-requests");

    shutdown_signal().await;
    info!("shutdown signal received, starting graceful shutdown");

    if let Err(e) = worker_pool.shutdown_graceful(SHUTDOWN_GRACE).await {
        error!(error = %e, "worker pool shutdown incomplete");
    }

    tokio::select! {
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            info!("shutdown grace period expired");
        }
        _ = server_handle => {
            info!("HTTP server stopped");
        }
    }

    db_pool.close().await;
    info!("database connections closed");

    info!("mailroom shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,mailroom=debug,tower_http=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with bounded retry.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url())
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Runs idempotent schema migrations.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS emails (
            id BIGSERIAL PRIMARY KEY,
            to_address TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'sent', 'failed')),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create emails table")?;

    // Partial index covering the claim predicate.
    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_emails_claimable
        ON emails(id)
        WHERE status IN ('pending', 'failed')
        ",
    )
    .execute(pool)
    .await
    .context("failed to create claimable index")?;

    // Partial index covering the reaper predicate.
    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_emails_stuck
        ON emails(updated_at)
        WHERE status = 'processing'
        ",
    )
    .execute(pool)
    .await
    .context("failed to create stuck index")?;

    Ok(())
}

/// Waits for CTRL+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received CTRL+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
