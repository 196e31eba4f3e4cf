// crates/core/src/stage.rs
//! Pipeline stage taxonomy and the stage → overall-percentage mapping.

use serde::{Deserialize, Serialize};

/// The seven analysis stages, in execution order.
///
/// Each stage owns a contiguous slice of the 0–100 overall range; a stage
/// reports sub-progress 0–100 which is mapped into its slice. Slices follow
/// execution order so the overall percentage never regresses mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Literature/reference search for the requested organisms.
    Search,
    /// Candidate therapy extraction from the gathered sources.
    Extract,
    /// Normalization and de-duplication of the extracted entries.
    Parse,
    /// Coverage classification of entries with unknown applicability.
    Rank,
    /// Synthesis of the categorized therapy plan.
    Synthesize,
    /// Severity-code to ICD-name transformation.
    IcdTransform,
    /// Dosage/consideration enrichment and negative-finding computation.
    Enrichment,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 7] = [
        Stage::Search,
        Stage::Extract,
        Stage::Parse,
        Stage::Rank,
        Stage::Synthesize,
        Stage::IcdTransform,
        Stage::Enrichment,
    ];

    /// The slice of the overall 0–100 range owned by this stage.
    fn range(self) -> (u8, u8) {
        match self {
            Stage::Search => (0, 10),
            Stage::Extract => (10, 35),
            Stage::Parse => (35, 45),
            Stage::Rank => (45, 55),
            Stage::Synthesize => (55, 70),
            Stage::IcdTransform => (70, 80),
            Stage::Enrichment => (80, 100),
        }
    }

    /// Short machine-readable label, used as `current_stage` in the store
    /// and as the `stage` field of progress events.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Search => "search",
            Stage::Extract => "extract",
            Stage::Parse => "parse",
            Stage::Rank => "rank",
            Stage::Synthesize => "synthesize",
            Stage::IcdTransform => "icd_transform",
            Stage::Enrichment => "enrichment",
        }
    }

    /// Map sub-progress within this stage (0–100, clamped) to the overall
    /// pipeline percentage.
    pub fn overall_progress(self, sub_progress: u8) -> u8 {
        let sub = sub_progress.min(100) as u32;
        let (start, end) = self.range();
        let span = (end - start) as u32;
        start + (span * sub / 100) as u8
    }
}
