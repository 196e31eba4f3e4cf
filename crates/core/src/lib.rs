// crates/core/src/lib.rs
//! Domain types and seams for the molecular pipeline.
//!
//! This crate defines the shapes shared by the server, the session store,
//! and the analysis engine:
//! - [`PipelineInput`] / [`PipelineResult`] — request and result payloads
//! - [`Stage`] — the pipeline stage taxonomy and its progress mapping
//! - [`PipelineEngine`] / [`ProgressSink`] — the seam behind which the
//!   actual domain computation runs
//! - [`render_report`] — printable report rendering for completed results

pub mod engine;
pub mod input;
pub mod progress;
pub mod report;
pub mod result;
pub mod stage;

pub use engine::{EngineError, PipelineEngine};
pub use input::{PathogenEntry, PipelineInput, ValidationError};
pub use progress::ProgressSink;
pub use report::{render_report, render_report_json, ReportError};
pub use result::{
    AnalysisResult, AntibioticEntry, IcdTransformation, PipelineResult, ResistanceGeneEntry,
    TherapyPlan,
};
pub use stage::Stage;
