// crates/server/src/routes/sessions.rs
//! Read-side session endpoints: listing, active lookup, fetch by id.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use molecular_pipeline_db::{SessionRecord, SessionStatus, SessionSummary};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// GET /api/sessions — recent sessions, newest-created first.
async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<SessionListResponse>> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(SessionStatus::parse(raw).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Invalid status '{raw}'. Valid options: running, completed, error"
            ))
        })?),
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let sessions = state.db.list_sessions(limit, status).await?;
    Ok(Json(SessionListResponse { sessions }))
}

#[derive(Debug, Serialize)]
pub struct ActiveSessionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRecord>,
}

impl ActiveSessionResponse {
    fn none() -> Self {
        Self {
            active: false,
            session_id: None,
            session: None,
        }
    }

    fn some(session: SessionRecord) -> Self {
        Self {
            active: true,
            session_id: Some(session.session_id.clone()),
            session: Some(session),
        }
    }
}

/// GET /api/sessions/active — the running session for reload reattachment.
///
/// The gate is the authority on "what is running"; the store query is a
/// consistency fallback (it finds nothing stale because the startup sweep
/// already flipped orphaned rows to `error`).
async fn active_session(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ActiveSessionResponse>> {
    if let Some(session_id) = state.gate.active_session() {
        match state.db.get_session(&session_id).await {
            Ok(record) if record.status == SessionStatus::Running => {
                return Ok(Json(ActiveSessionResponse::some(record)));
            }
            Ok(_) => {}
            Err(molecular_pipeline_db::DbError::SessionNotFound(_)) => {
                // The gate is claimed but the record is not durable yet;
                // report idle rather than a half-created session.
            }
            Err(e) => return Err(e.into()),
        }
    }

    match state.db.find_active_running().await? {
        Some(record) => Ok(Json(ActiveSessionResponse::some(record))),
        None => Ok(Json(ActiveSessionResponse::none())),
    }
}

/// GET /api/sessions/{session_id} — full record including result or error.
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionRecord>> {
    let record = state.db.get_session(&session_id).await?;
    Ok(Json(record))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/active", get(active_session))
        .route("/sessions/{session_id}", get(get_session))
}
