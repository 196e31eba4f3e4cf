// crates/server/src/runner.rs
//! Drives one pipeline run to completion.
//!
//! `start` is the only mutating entry point: it claims the gate, persists
//! the initial session record, opens the live channel, and spawns the drive
//! task. The drive task relays every engine progress callback into the
//! store first (the durable write is authoritative) and the bus second, and
//! finalizes the session exactly once on success or failure. The gate token
//! lives inside the drive task, so the gate is released on every exit path,
//! including an engine panic, which is caught at the inner task boundary
//! and recorded as a failed session.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use molecular_pipeline_core::{PipelineEngine, PipelineInput, ProgressSink, Stage};
use molecular_pipeline_db::{Database, DbError};

use crate::bus::{ProgressBus, ProgressEvent};
use crate::gate::{RunGate, RunToken};

/// Failure starting a run. `Busy` is the 409 contract: no session record
/// and no channel exist for the rejected request.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("a pipeline is already running (session {active_session_id})")]
    Busy { active_session_id: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Spawns and tracks the single in-flight pipeline run.
pub struct PipelineRunner {
    db: Database,
    gate: Arc<RunGate>,
    bus: Arc<ProgressBus>,
    engine: Arc<dyn PipelineEngine>,
}

impl PipelineRunner {
    pub fn new(
        db: Database,
        gate: Arc<RunGate>,
        bus: Arc<ProgressBus>,
        engine: Arc<dyn PipelineEngine>,
    ) -> Self {
        Self {
            db,
            gate,
            bus,
            engine,
        }
    }

    /// Start a run for an already-validated input.
    ///
    /// Returns the new session id, or [`StartError::Busy`] with the active
    /// session id when the gate is held.
    pub async fn start(&self, input: PipelineInput) -> Result<String, StartError> {
        let session_id = Uuid::new_v4().to_string();

        let token = self
            .gate
            .try_acquire(&session_id)
            .map_err(|busy| StartError::Busy {
                active_session_id: busy.active_session_id,
            })?;

        // Durable before anything else can observe the run. On failure the
        // token drops here and the gate is free again.
        self.db.create_session(&session_id, &input).await?;
        self.bus.open(&session_id);

        tracing::info!(%session_id, engine = self.engine.name(), "pipeline started");

        tokio::spawn(drive(
            self.db.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&self.engine),
            token,
            session_id.clone(),
            input,
        ));

        Ok(session_id)
    }
}

/// Progress relay: durable write first, live publish second, so a store
/// reader is never behind a live subscriber.
struct SessionProgressSink {
    db: Database,
    bus: Arc<ProgressBus>,
    session_id: String,
}

#[async_trait]
impl ProgressSink for SessionProgressSink {
    async fn report(&self, stage: Stage, sub_progress: u8, message: Option<String>) {
        let percent = stage.overall_progress(sub_progress);
        let label = stage.label();
        let message = message.unwrap_or_else(|| format!("{label} ({sub_progress}%)"));

        if let Err(e) = self.db.append_progress(&self.session_id, percent, label).await {
            tracing::warn!(
                session_id = %self.session_id,
                error = %e,
                "failed to persist progress"
            );
        }
        self.bus
            .publish(&self.session_id, ProgressEvent::update(percent, label, message));
    }
}

async fn drive(
    db: Database,
    bus: Arc<ProgressBus>,
    engine: Arc<dyn PipelineEngine>,
    token: RunToken,
    session_id: String,
    input: PipelineInput,
) {
    let sink = Arc::new(SessionProgressSink {
        db: db.clone(),
        bus: Arc::clone(&bus),
        session_id: session_id.clone(),
    });

    // The engine runs on its own task so a panic surfaces as a JoinError
    // instead of unwinding through the finalization below.
    let engine_task = {
        let engine = Arc::clone(&engine);
        let input = input.clone();
        let sink = Arc::clone(&sink);
        tokio::spawn(async move { engine.run(&input, sink.as_ref()).await })
    };

    let outcome = match engine_task.await {
        Ok(outcome) => outcome,
        Err(join_error) => Err(molecular_pipeline_core::EngineError::internal(format!(
            "pipeline task aborted: {join_error}"
        ))),
    };

    match outcome {
        Ok(result) => match serde_json::to_value(&result) {
            Ok(value) => {
                if let Err(e) = db.complete_session(&session_id, &value).await {
                    tracing::error!(%session_id, error = %e, "failed to persist completion");
                }
                bus.publish(&session_id, ProgressEvent::completed(value));
                tracing::info!(%session_id, "pipeline completed");
            }
            Err(e) => {
                let message = format!("failed to encode result: {e}");
                finalize_failure(&db, &bus, &session_id, &message).await;
            }
        },
        Err(engine_error) => {
            finalize_failure(&db, &bus, &session_id, &engine_error.to_string()).await;
        }
    }

    bus.close(&session_id);
    // Store and bus writes above are best-effort reporting; releasing the
    // gate is not. The token drops here on every path.
    drop(token);
}

async fn finalize_failure(db: &Database, bus: &ProgressBus, session_id: &str, message: &str) {
    if let Err(e) = db.fail_session(session_id, message).await {
        tracing::error!(session_id, error = %e, "failed to persist failure");
    }
    bus.publish(session_id, ProgressEvent::failed(message));
    tracing::warn!(session_id, error = message, "pipeline failed");
}
