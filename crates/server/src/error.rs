// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use molecular_pipeline_core::{ReportError, ValidationError};
use molecular_pipeline_db::DbError;

use crate::runner::StartError;

/// Structured JSON error response for API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Present only on `Busy` responses: the session the caller can attach to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_session_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            current_session_id: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
            current_session_id: None,
        }
    }
}

/// API error types that map to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("A pipeline is already running (session {active_session_id})")]
    Busy { active_session_id: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Report rendering failed: {0}")]
    Render(#[from] ReportError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<StartError> for ApiError {
    fn from(err: StartError) -> Self {
        match err {
            StartError::Busy { active_session_id } => ApiError::Busy { active_session_id },
            StartError::Db(db) => ApiError::Database(db),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Validation(err) => {
                tracing::warn!(error = %err, "rejected pipeline input");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid input", err.to_string()),
                )
            }
            ApiError::Busy { active_session_id } => {
                tracing::warn!(%active_session_id, "start rejected, pipeline already running");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse {
                        error: "Pipeline is already running. Please wait for the current \
                                execution to complete."
                            .to_string(),
                        details: None,
                        current_session_id: Some(active_session_id.clone()),
                    },
                )
            }
            ApiError::Database(DbError::SessionNotFound(id)) => {
                tracing::warn!(session_id = %id, "session not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Session not found", format!("Session ID: {id}")),
                )
            }
            ApiError::Database(DbError::TerminalSession(id)) => {
                tracing::warn!(session_id = %id, "write to terminal session rejected");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details(
                        "Session already finished",
                        format!("Session ID: {id}"),
                    ),
                )
            }
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Database error"),
                )
            }
            ApiError::Render(err) => {
                tracing::error!(error = %err, "report rendering failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Report rendering failed", err.to_string()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
