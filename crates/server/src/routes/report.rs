// crates/server/src/routes/report.rs
//! Printable report download for completed results.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use molecular_pipeline_core::render_report_json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReportRequest {
    /// Render the stored result of this session.
    pub session_id: Option<String>,
    /// Or render an inline result document.
    pub data: Option<serde_json::Value>,
}

/// POST /api/report — render a completed result as a downloadable document.
///
/// A render failure only affects this request; the session record is
/// read, never written.
async fn download_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<Response> {
    let payload = match (request.session_id, request.data) {
        (Some(session_id), _) => {
            let record = state.db.get_session(&session_id).await?;
            record.result.ok_or_else(|| {
                ApiError::BadRequest(format!("No result data found for session {session_id}"))
            })?
        }
        (None, Some(data)) => data,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "Either session_id or data must be provided".to_string(),
            ))
        }
    };

    let bytes = render_report_json(&payload)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"therapy-report.html\"",
            ),
        ],
        bytes,
    )
        .into_response())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/report", post(download_report))
}
