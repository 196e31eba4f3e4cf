// crates/server/src/main.rs
//! Molecular-pipeline server binary.
//!
//! Opens the session store, sweeps sessions orphaned by an unclean
//! shutdown, and serves the API. Exactly one pipeline runs at a time; a
//! hung run blocks new starts until the process is restarted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use molecular_pipeline_db::Database;
use molecular_pipeline_engine::ReferenceEngine;
use molecular_pipeline_server::{create_app, AppState};

/// Default port for the server.
const DEFAULT_PORT: u16 = 8000;

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("MOLECULAR_PIPELINE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let db = Database::open_default().await?;

    // A `running` row older than this process is a job that died with the
    // previous one; flip it to `error` before anyone reads it as live.
    let swept = db.mark_interrupted().await?;
    if swept > 0 {
        tracing::warn!(count = swept, "marked orphaned running sessions as interrupted");
    }

    let engine = Arc::new(ReferenceEngine::new());
    let state = AppState::new(db, engine);
    let app = create_app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], get_port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("molecular-pipeline v{} listening on http://{addr}", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
