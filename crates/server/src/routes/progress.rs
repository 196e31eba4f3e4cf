// crates/server/src/routes/progress.rs
//! SSE stream of progress events for one session.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast::error::RecvError;

use molecular_pipeline_db::SessionStatus;

use crate::bus::ProgressEvent;
use crate::error::ApiResult;
use crate::state::AppState;

fn sse_event(event: &ProgressEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_default())
}

/// GET /api/progress/{session_id} — live progress stream.
///
/// Unknown ids are a plain 404 before any stream starts. A terminal session
/// yields its terminal event immediately and ends. A running session yields
/// one snapshot event from the store (covering whatever happened before this
/// subscriber joined), then live bus events until the terminal one.
async fn progress_stream(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before snapshotting so nothing published in between is
    // missed; a duplicated update is fine (at-least-once, last-value-wins).
    let rx = state.bus.subscribe(&session_id);
    let snapshot = state.db.get_session(&session_id).await?;

    let stream = async_stream::stream! {
        match snapshot.status {
            SessionStatus::Completed => {
                let result = snapshot.result.unwrap_or(serde_json::Value::Null);
                yield Ok(sse_event(&ProgressEvent::completed(result)));
                return;
            }
            SessionStatus::Error => {
                let message = snapshot
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string());
                yield Ok(sse_event(&ProgressEvent::failed(message)));
                return;
            }
            SessionStatus::Running => {}
        }

        let stage = snapshot
            .current_stage
            .unwrap_or_else(|| "running".to_string());
        yield Ok(sse_event(&ProgressEvent::update(
            snapshot.progress,
            stage.clone(),
            format!("Resumed: {stage}"),
        )));

        let Some(mut rx) = rx else {
            // A running row without a live channel means the runner is gone;
            // nothing will ever finalize this stream.
            yield Ok(sse_event(&ProgressEvent::failed("session has no live runner")));
            return;
        };

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    yield Ok(sse_event(&event));
                    if terminal {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(%session_id, skipped, "subscriber lagged, skipping ahead");
                }
                Err(RecvError::Closed) => break,
            }
        }

        // Channel torn down before this subscriber saw the terminal event:
        // the store has the authoritative final state.
        let event = match state.db.get_session(&session_id).await {
            Ok(record) => match record.status {
                SessionStatus::Completed => {
                    ProgressEvent::completed(record.result.unwrap_or(serde_json::Value::Null))
                }
                SessionStatus::Error => ProgressEvent::failed(
                    record
                        .error_message
                        .unwrap_or_else(|| "unknown error".to_string()),
                ),
                SessionStatus::Running => ProgressEvent::failed("progress stream interrupted"),
            },
            Err(e) => ProgressEvent::failed(e.to_string()),
        };
        yield Ok(sse_event(&event));
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/progress/{session_id}", get(progress_stream))
}
