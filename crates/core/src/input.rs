// crates/core/src/input.rs
//! Pipeline request payload and its validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound accepted for the optional patient age.
const MAX_AGE: u16 = 130;

/// A single detected organism with its reported load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathogenEntry {
    pub pathogen_name: String,
    /// Reported count/load, kept as the free-form string the panel produced
    /// (e.g. "10^5 CFU/mL", "high").
    pub pathogen_count: String,
}

/// Input parameters for one pipeline run.
///
/// Stored verbatim on the session record at creation, so a run is
/// reproducible from its session alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    pub pathogens: Vec<PathogenEntry>,
    pub resistant_genes: Vec<String>,
    pub severity_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systemic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergy: Option<Vec<String>>,
}

/// Rejection of a malformed request, raised before any session is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one pathogen is required")]
    NoPathogens,

    #[error("pathogen name must not be blank")]
    BlankPathogenName,

    #[error("at least one severity code is required")]
    NoSeverityCodes,

    #[error("age {0} is out of range (0-{MAX_AGE})")]
    AgeOutOfRange(u16),
}

impl PipelineInput {
    /// Validate the payload. Called by the start endpoint before a session
    /// record exists, so a rejected request leaves nothing behind.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pathogens.is_empty() {
            return Err(ValidationError::NoPathogens);
        }
        if self
            .pathogens
            .iter()
            .any(|p| p.pathogen_name.trim().is_empty())
        {
            return Err(ValidationError::BlankPathogenName);
        }
        if self.severity_codes.is_empty() {
            return Err(ValidationError::NoSeverityCodes);
        }
        if let Some(age) = self.age {
            if age > MAX_AGE {
                return Err(ValidationError::AgeOutOfRange(age));
            }
        }
        Ok(())
    }

    /// Names of the organisms in panel order.
    pub fn pathogen_names(&self) -> Vec<&str> {
        self.pathogens
            .iter()
            .map(|p| p.pathogen_name.as_str())
            .collect()
    }

    /// True when `class_name` appears in the allergy list (case-insensitive).
    pub fn is_allergic_to(&self, class_name: &str) -> bool {
        self.allergy
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|a| a.eq_ignore_ascii_case(class_name))
    }
}
