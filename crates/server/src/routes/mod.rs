//! API route handlers for the pipeline server.

pub mod health;
pub mod progress;
pub mod report;
pub mod run;
pub mod sessions;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under the /api prefix.
///
/// Routes:
/// - GET  /api/health                - Health check
/// - POST /api/run                   - Start a pipeline run (409 when one is active)
/// - GET  /api/sessions              - List sessions, newest first
/// - GET  /api/sessions/active       - The currently running session, if any
/// - GET  /api/sessions/{session_id} - Full session record
/// - GET  /api/progress/{session_id} - SSE stream of progress events
/// - POST /api/report                - Download the printable report
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", run::router())
        .nest("/api", sessions::router())
        .nest("/api", progress::router())
        .nest("/api", report::router())
        .with_state(state)
}
