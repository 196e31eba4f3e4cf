// crates/core/src/engine.rs
//! The `PipelineEngine` trait — the seam behind which the domain
//! computation runs.

use async_trait::async_trait;
use thiserror::Error;

use crate::input::PipelineInput;
use crate::progress::ProgressSink;
use crate::result::PipelineResult;
use crate::stage::Stage;

/// Structured failure raised by a pipeline engine.
///
/// The session manager converts any of these into a terminal `error`
/// session; it never lets them propagate past the runner.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A stage could not produce its output.
    #[error("{stage:?} stage failed: {message}")]
    Stage { stage: Stage, message: String },

    /// The run failed outside any particular stage.
    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// A long-running analysis computation.
///
/// Implementations include:
/// - `ReferenceEngine` — the deterministic embedded-knowledge engine the
///   shipped binary wires in
/// - scripted fakes in the session-manager tests
///
/// The engine receives the validated input and a progress sink; it either
/// returns the full structured result or a structured failure. It must not
/// assume anything about who is listening to the sink.
#[async_trait]
pub trait PipelineEngine: Send + Sync {
    async fn run(
        &self,
        input: &PipelineInput,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineResult, EngineError>;

    /// Engine name for logging/display.
    fn name(&self) -> &str;
}
