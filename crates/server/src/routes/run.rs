// crates/server/src/routes/run.rs
//! Pipeline start endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use molecular_pipeline_core::PipelineInput;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: String,
}

/// POST /api/run — start a pipeline run.
///
/// Validation happens before any session is created, so a rejected request
/// leaves no partial record. When another run is in flight the response is
/// 409 with the active session id, and nothing is created either.
async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PipelineInput>,
) -> ApiResult<Json<StartResponse>> {
    input.validate()?;
    let session_id = state.runner.start(input).await?;
    Ok(Json(StartResponse { session_id }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/run", post(run_pipeline))
}
