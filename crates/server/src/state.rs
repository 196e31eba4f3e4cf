// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use molecular_pipeline_core::PipelineEngine;
use molecular_pipeline_db::Database;

use crate::bus::ProgressBus;
use crate::gate::RunGate;
use crate::runner::PipelineRunner;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Session store handle.
    pub db: Database,
    /// The one-job-at-a-time gate; also answers "what is running right now".
    pub gate: Arc<RunGate>,
    /// Live progress fan-out for the running session.
    pub bus: Arc<ProgressBus>,
    /// Start-side entry point; owns the same gate/bus/db handles.
    pub runner: PipelineRunner,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(db: Database, engine: Arc<dyn PipelineEngine>) -> Arc<Self> {
        let gate = RunGate::new();
        let bus = Arc::new(ProgressBus::new());
        let runner = PipelineRunner::new(db.clone(), Arc::clone(&gate), Arc::clone(&bus), engine);
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            gate,
            bus,
            runner,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
