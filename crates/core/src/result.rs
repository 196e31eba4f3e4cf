// crates/core/src/result.rs
//! Structured output of a completed pipeline run.

use serde::{Deserialize, Serialize};

use crate::input::PipelineInput;

/// One recommended antimicrobial agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntibioticEntry {
    pub medical_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_of_administration: Option<String>,
    /// Free-form `dose,route,frequency,duration` string as the source
    /// material records it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dose_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renal_adjustment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_considerations: Option<String>,
    #[serde(default)]
    pub is_combined: bool,
}

/// Therapy plan categorized by choice tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TherapyPlan {
    #[serde(default)]
    pub first_choice: Vec<AntibioticEntry>,
    #[serde(default)]
    pub second_choice: Vec<AntibioticEntry>,
    #[serde(default)]
    pub alternative_antibiotic: Vec<AntibioticEntry>,
}

impl TherapyPlan {
    /// Total number of recommended agents across all tiers.
    pub fn len(&self) -> usize {
        self.first_choice.len() + self.second_choice.len() + self.alternative_antibiotic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Analysis of one detected resistance gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResistanceGeneEntry {
    pub detected_resistant_gene_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_medication_class_affected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_considerations: Option<String>,
}

/// The core analysis block: therapy plan plus resistance-gene commentary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub antibiotic_therapy_plan: TherapyPlan,
    #[serde(default)]
    pub pharmacist_analysis_on_resistant_gene: Vec<ResistanceGeneEntry>,
}

/// A severity code resolved to its ICD name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcdTransformation {
    pub code: String,
    pub name: String,
}

/// The full structured output of a completed run, persisted verbatim on the
/// session record and replayed to late readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The request echoed back for reproducibility.
    pub input_parameters: PipelineInput,
    /// RFC 3339 timestamp of when the analysis ran.
    pub extraction_date: String,
    pub result: AnalysisResult,
    #[serde(default)]
    pub icd_transformation: Vec<IcdTransformation>,
    /// Requested organisms the analysis found no therapy entry for.
    #[serde(default)]
    pub negative_organisms: Vec<String>,
    /// Requested resistance genes the analysis found no commentary for.
    #[serde(default)]
    pub negative_resistance_genes: Vec<String>,
}
