// crates/server/src/lib.rs
//! Molecular-pipeline server library.
//!
//! The Job Session Manager: one pipeline run at a time behind the
//! [`gate::RunGate`], durable state in the session store, live fan-out over
//! the [`bus::ProgressBus`], and the Axum HTTP surface tying them together.

pub mod bus;
pub mod error;
pub mod gate;
pub mod routes;
pub mod runner;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, run, sessions, progress, report)
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use molecular_pipeline_db::Database;
    use molecular_pipeline_engine::ReferenceEngine;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let db = Database::new_in_memory().await.expect("in-memory DB");
        let state = AppState::new(db, Arc::new(ReferenceEngine::new()));
        create_app(state)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let (status, body) = get(test_app().await, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _) = get(test_app().await, "/api/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("Origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let allow_origin = response.headers().get("access-control-allow-origin");
        assert_eq!(allow_origin.unwrap(), "*");
    }
}
