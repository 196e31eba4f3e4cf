// crates/core/src/progress.rs
//! Progress-reporting seam between the engine and the session manager.

use async_trait::async_trait;

use crate::stage::Stage;

/// Receiver for incremental progress reports from a running pipeline.
///
/// The engine calls [`report`](ProgressSink::report) as it works; the
/// session manager's implementation persists the mapped overall percentage
/// and fans the event out to live subscribers. Reporting is best-effort:
/// implementations must not fail the run over a sink problem, so `report`
/// returns nothing.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Report sub-progress (0–100) within `stage`, with an optional
    /// human-readable message. When `message` is `None` the sink derives
    /// one from the stage label.
    async fn report(&self, stage: Stage, sub_progress: u8, message: Option<String>);
}

/// Sink that discards every report. Useful for tests and for running the
/// engine outside the session manager.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl ProgressSink for NullSink {
    async fn report(&self, _stage: Stage, _sub_progress: u8, _message: Option<String>) {}
}
