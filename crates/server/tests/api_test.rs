// crates/server/tests/api_test.rs
//! Route-level tests over the composed router.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tokio::sync::Notify;
use tower::ServiceExt;

use molecular_pipeline_core::{
    AnalysisResult, AntibioticEntry, EngineError, PipelineEngine, PipelineInput, PipelineResult,
    ProgressSink, Stage, TherapyPlan,
};
use molecular_pipeline_db::Database;
use molecular_pipeline_engine::ReferenceEngine;
use molecular_pipeline_server::{create_app, AppState};

// ============================================================================
// Helpers
// ============================================================================

async fn app_with_engine(engine: Arc<dyn PipelineEngine>) -> Router {
    let db = Database::new_in_memory().await.expect("in-memory DB");
    create_app(AppState::new(db, engine))
}

async fn reference_app() -> Router {
    app_with_engine(Arc::new(ReferenceEngine::new())).await
}

fn input_json(pathogen: &str, marker: &str) -> serde_json::Value {
    serde_json::json!({
        "pathogens": [{"pathogen_name": pathogen, "pathogen_count": "10^5 CFU/mL"}],
        "resistant_genes": [],
        "severity_codes": ["N39.0"],
        "panel": marker,
    })
}

async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn post_json(app: &Router, uri: &str, body: &serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Poll the by-id endpoint until the session reaches a terminal status.
async fn wait_for_terminal(app: &Router, session_id: &str) -> serde_json::Value {
    for _ in 0..400 {
        let (status, record) = get(app, &format!("/api/sessions/{session_id}")).await;
        assert_eq!(status, StatusCode::OK);
        if record["status"] != "running" {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {session_id} never reached a terminal status");
}

/// Poll `/api/run` until the gate frees up and a start succeeds.
async fn start_until_accepted(app: &Router, body: &serde_json::Value) -> String {
    for _ in 0..400 {
        let (status, response) = post_json(app, "/api/run", body).await;
        if status == StatusCode::OK {
            return response["session_id"].as_str().unwrap().to_string();
        }
        assert_eq!(status, StatusCode::CONFLICT);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("gate never freed up");
}

/// Engine that holds the run open until the test releases it.
struct GatedEngine {
    release: Arc<Notify>,
    fail_with: Option<String>,
}

#[async_trait]
impl PipelineEngine for GatedEngine {
    async fn run(
        &self,
        input: &PipelineInput,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineResult, EngineError> {
        progress.report(Stage::Search, 100, None).await;
        self.release.notified().await;
        match &self.fail_with {
            Some(message) => Err(EngineError::internal(message.clone())),
            None => Ok(PipelineResult {
                input_parameters: input.clone(),
                extraction_date: chrono::Utc::now().to_rfc3339(),
                result: AnalysisResult {
                    antibiotic_therapy_plan: TherapyPlan {
                        first_choice: vec![AntibioticEntry {
                            medical_name: "Nitrofurantoin".to_string(),
                            coverage_for: None,
                            route_of_administration: None,
                            dose_duration: None,
                            renal_adjustment: None,
                            general_considerations: None,
                            is_combined: false,
                        }],
                        ..TherapyPlan::default()
                    },
                    pharmacist_analysis_on_resistant_gene: vec![],
                },
                icd_transformation: vec![],
                negative_organisms: vec![],
                negative_resistance_genes: vec![],
            }),
        }
    }

    fn name(&self) -> &str {
        "gated"
    }
}

// ============================================================================
// Start + lifecycle
// ============================================================================

#[tokio::test]
async fn run_starts_and_completes_with_a_result() {
    let app = reference_app().await;

    let (status, response) =
        post_json(&app, "/api/run", &input_json("Escherichia coli", "t1")).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = response["session_id"].as_str().unwrap().to_string();

    let record = wait_for_terminal(&app, &session_id).await;
    assert_eq!(record["status"], "completed");
    assert_eq!(record["progress"], 100);
    let first_choice = &record["result"]["result"]["antibiotic_therapy_plan"]["first_choice"];
    assert!(first_choice
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["medical_name"] == "Nitrofurantoin"));
}

#[tokio::test]
async fn invalid_input_is_rejected_without_creating_a_session() {
    let app = reference_app().await;

    let body = serde_json::json!({
        "pathogens": [],
        "resistant_genes": [],
        "severity_codes": ["N39.0"],
    });
    let (status, response) = post_json(&app, "/api/run", &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Invalid input");

    let (status, listing) = get(&app, "/api/sessions").await;
    assert_eq!(status, StatusCode::OK);
    assert!(listing["sessions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_start_conflicts_with_the_active_session() {
    let release = Arc::new(Notify::new());
    let app = app_with_engine(Arc::new(GatedEngine {
        release: Arc::clone(&release),
        fail_with: None,
    }))
    .await;

    // Job A wins the gate.
    let (status, response) = post_json(&app, "/api/run", &input_json("Escherichia coli", "x1")).await;
    assert_eq!(status, StatusCode::OK);
    let session_a = response["session_id"].as_str().unwrap().to_string();

    // Job B is rejected and pointed at A. No second session appears.
    let (status, conflict) =
        post_json(&app, "/api/run", &input_json("Escherichia coli", "x2")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["current_session_id"], session_a.as_str());
    let (_, listing) = get(&app, "/api/sessions").await;
    assert_eq!(listing["sessions"].as_array().unwrap().len(), 1);

    // A completes with its result; a fresh start now succeeds with a new id.
    release.notify_one();
    let record = wait_for_terminal(&app, &session_a).await;
    assert_eq!(record["status"], "completed");

    release.notify_one();
    let session_c = start_until_accepted(&app, &input_json("Escherichia coli", "x2")).await;
    assert_ne!(session_c, session_a);
    wait_for_terminal(&app, &session_c).await;
}

#[tokio::test]
async fn failed_run_is_terminal_and_frees_the_gate() {
    let release = Arc::new(Notify::new());
    let app = app_with_engine(Arc::new(GatedEngine {
        release: Arc::clone(&release),
        fail_with: Some("boom".to_string()),
    }))
    .await;

    let (status, response) = post_json(&app, "/api/run", &input_json("Escherichia coli", "f1")).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = response["session_id"].as_str().unwrap().to_string();

    release.notify_one();
    let record = wait_for_terminal(&app, &session_id).await;
    assert_eq!(record["status"], "error");
    assert_eq!(record["error_message"], "boom");
    assert!(record.get("result").is_none());

    // The gate is free despite the failure.
    release.notify_one();
    let next = start_until_accepted(&app, &input_json("Escherichia coli", "f2")).await;
    assert_ne!(next, session_id);
    wait_for_terminal(&app, &next).await;
}

// ============================================================================
// Read side
// ============================================================================

#[tokio::test]
async fn get_unknown_session_is_404() {
    let app = reference_app().await;
    let (status, body) = get(&app, "/api/sessions/no-such-session").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session not found");
}

#[tokio::test]
async fn active_session_tracks_the_running_job() {
    let release = Arc::new(Notify::new());
    let app = app_with_engine(Arc::new(GatedEngine {
        release: Arc::clone(&release),
        fail_with: None,
    }))
    .await;

    let (_, body) = get(&app, "/api/sessions/active").await;
    assert_eq!(body["active"], false);

    let (_, response) = post_json(&app, "/api/run", &input_json("Escherichia coli", "a1")).await;
    let session_id = response["session_id"].as_str().unwrap().to_string();

    let (status, body) = get(&app, "/api/sessions/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert_eq!(body["session_id"], session_id.as_str());
    assert_eq!(body["session"]["status"], "running");

    release.notify_one();
    wait_for_terminal(&app, &session_id).await;

    // No stale "running" reporting after the terminal transition.
    for _ in 0..400 {
        let (_, body) = get(&app, "/api/sessions/active").await;
        if body["active"] == false {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("active endpoint kept reporting a finished session");
}

#[tokio::test]
async fn listing_is_newest_first_with_limit_and_filter() {
    let app = reference_app().await;

    let first = start_until_accepted(&app, &input_json("Escherichia coli", "l1")).await;
    wait_for_terminal(&app, &first).await;
    let second = start_until_accepted(&app, &input_json("Proteus hauseri", "l2")).await;
    let record = wait_for_terminal(&app, &second).await;
    assert_eq!(record["status"], "error");

    let (_, listing) = get(&app, "/api/sessions").await;
    let sessions = listing["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["session_id"], second.as_str());
    assert_eq!(sessions[1]["session_id"], first.as_str());

    let (_, limited) = get(&app, "/api/sessions?limit=1").await;
    assert_eq!(limited["sessions"].as_array().unwrap().len(), 1);

    let (_, completed) = get(&app, "/api/sessions?status=completed").await;
    let sessions = completed["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], first.as_str());

    let (status, body) = get(&app, "/api/sessions?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad request");
}

// ============================================================================
// Progress stream
// ============================================================================

#[tokio::test]
async fn progress_stream_for_unknown_session_is_404() {
    let app = reference_app().await;
    let (status, _) = get(&app, "/api/progress/no-such-session").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn progress_stream_replays_the_terminal_event_for_finished_sessions() {
    let app = reference_app().await;

    let session_id = start_until_accepted(&app, &input_json("Escherichia coli", "s1")).await;
    wait_for_terminal(&app, &session_id).await;

    // For a terminal session the stream emits one terminal event and ends,
    // so the whole body is readable.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("\"stage\":\"complete\""));
    assert!(text.contains("\"result\""));
    assert_eq!(text.matches("\"stage\":\"complete\"").count(), 1);
}

#[tokio::test]
async fn progress_stream_replays_the_error_for_failed_sessions() {
    let app = reference_app().await;

    // An organism outside the reference set fails the run.
    let session_id = start_until_accepted(&app, &input_json("Proteus hauseri", "s2")).await;
    wait_for_terminal(&app, &session_id).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("\"stage\":\"error\""));
    assert!(text.contains("no reference data"));
}

// ============================================================================
// Report
// ============================================================================

#[tokio::test]
async fn report_downloads_for_a_completed_session() {
    let app = reference_app().await;

    let session_id = start_until_accepted(&app, &input_json("Escherichia coli", "r1")).await;
    wait_for_terminal(&app, &session_id).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/report")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({"session_id": session_id}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("attachment"));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("Nitrofurantoin"));
    assert!(html.contains("Antimicrobial Therapy Report"));
}

#[tokio::test]
async fn report_for_a_running_session_is_rejected() {
    let release = Arc::new(Notify::new());
    let app = app_with_engine(Arc::new(GatedEngine {
        release: Arc::clone(&release),
        fail_with: None,
    }))
    .await;

    let (_, response) = post_json(&app, "/api/run", &input_json("Escherichia coli", "r2")).await;
    let session_id = response["session_id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        "/api/report",
        &serde_json::json!({"session_id": session_id}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("No result data"));

    release.notify_one();
    wait_for_terminal(&app, &session_id).await;
}

#[tokio::test]
async fn report_request_needs_a_session_or_inline_data() {
    let app = reference_app().await;

    let (status, _) = post_json(
        &app,
        "/api/report",
        &serde_json::json!({"session_id": "no-such-session"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post_json(&app, "/api/report", &serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("session_id or data"));
}
