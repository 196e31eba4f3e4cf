// crates/engine/src/lib.rs
//! Deterministic reference implementation of [`PipelineEngine`].
//!
//! Runs the seven analysis stages in order over the embedded knowledge
//! tables in [`knowledge`]. The original system delegated search and
//! synthesis to external services; this engine keeps the same staged shape
//! and progress cadence while staying fully offline, which is what the
//! shipped binary wires in by default.

pub mod knowledge;

use async_trait::async_trait;
use chrono::Utc;

use molecular_pipeline_core::{
    AnalysisResult, AntibioticEntry, EngineError, IcdTransformation, PipelineEngine,
    PipelineInput, PipelineResult, ProgressSink, ResistanceGeneEntry, Stage, TherapyPlan,
};

use knowledge::{gene_ref, icd_name, therapies_for, TherapyRef, Tier};

/// The default, embedded-knowledge pipeline engine.
#[derive(Debug, Default)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    pub fn new() -> Self {
        Self
    }
}

/// A candidate recommendation as it moves through the stages.
struct Candidate {
    row: &'static TherapyRef,
    coverage: Vec<String>,
}

#[async_trait]
impl PipelineEngine for ReferenceEngine {
    async fn run(
        &self,
        input: &PipelineInput,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineResult, EngineError> {
        // Search: resolve each requested organism against the reference set.
        progress
            .report(Stage::Search, 0, Some("Searching reference data...".into()))
            .await;
        let organisms = input.pathogen_names();
        let mut matched: Vec<(&str, Vec<&'static TherapyRef>)> = Vec::new();
        let mut negative_organisms: Vec<String> = Vec::new();
        for (i, &name) in organisms.iter().enumerate() {
            let rows = therapies_for(name);
            if rows.is_empty() {
                negative_organisms.push(name.to_string());
            } else {
                matched.push((name, rows));
            }
            let sub = ((i + 1) * 100 / organisms.len()) as u8;
            progress.report(Stage::Search, sub, None).await;
        }
        if matched.is_empty() {
            return Err(EngineError::stage(
                Stage::Search,
                format!(
                    "no reference data for any requested organism ({})",
                    organisms.join(", ")
                ),
            ));
        }

        // Extract: turn matched rows into candidate entries, and resolve
        // resistance-gene commentary.
        progress
            .report(Stage::Extract, 0, Some("Extracting candidate therapies...".into()))
            .await;
        let mut candidates: Vec<Candidate> = Vec::new();
        for (i, (organism, rows)) in matched.iter().enumerate() {
            for &row in rows {
                candidates.push(Candidate {
                    row,
                    coverage: vec![organism.to_string()],
                });
            }
            let sub = ((i + 1) * 100 / matched.len()) as u8;
            progress.report(Stage::Extract, sub, None).await;
        }

        let mut gene_entries: Vec<ResistanceGeneEntry> = Vec::new();
        let mut negative_genes: Vec<String> = Vec::new();
        for gene in &input.resistant_genes {
            match gene_ref(gene) {
                Some(entry) => gene_entries.push(ResistanceGeneEntry {
                    detected_resistant_gene_name: gene.clone(),
                    potential_medication_class_affected: Some(entry.class_affected.to_string()),
                    general_considerations: Some(entry.considerations.to_string()),
                }),
                None => negative_genes.push(gene.clone()),
            }
        }

        // Parse: merge duplicate agents recommended for several organisms.
        progress
            .report(Stage::Parse, 50, Some("Normalizing entries...".into()))
            .await;
        let mut merged: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            let existing = merged
                .iter()
                .position(|m| m.row.agent.eq_ignore_ascii_case(candidate.row.agent));
            match existing {
                Some(idx) => {
                    for organism in candidate.coverage {
                        if !merged[idx].coverage.contains(&organism) {
                            merged[idx].coverage.push(organism);
                        }
                    }
                }
                None => merged.push(candidate),
            }
        }
        progress.report(Stage::Parse, 100, None).await;

        // Rank: drop agents whose class is compromised by a detected
        // resistance gene or a reported allergy.
        progress
            .report(Stage::Rank, 0, Some("Classifying coverage...".into()))
            .await;
        let compromised: Vec<String> = gene_entries
            .iter()
            .filter_map(|g| g.potential_medication_class_affected.clone())
            .collect();
        let usable: Vec<Candidate> = merged
            .into_iter()
            .filter(|c| {
                let class = c.row.class;
                let gene_hit = compromised.iter().any(|g| g.eq_ignore_ascii_case(class));
                let allergy_hit = input.is_allergic_to(class);
                if gene_hit {
                    tracing::debug!(agent = c.row.agent, class, "excluded by resistance gene");
                }
                if allergy_hit {
                    tracing::debug!(agent = c.row.agent, class, "excluded by reported allergy");
                }
                !gene_hit && !allergy_hit
            })
            .collect();
        progress.report(Stage::Rank, 100, None).await;

        if usable.is_empty() {
            return Err(EngineError::stage(
                Stage::Rank,
                "every candidate therapy is excluded by resistance genes or allergies",
            ));
        }

        // Synthesize: assemble the tiered plan.
        progress
            .report(Stage::Synthesize, 0, Some("Synthesizing therapy plan...".into()))
            .await;
        let mut plan = TherapyPlan::default();
        for candidate in &usable {
            let entry = to_entry(candidate);
            match candidate.row.tier {
                Tier::First => plan.first_choice.push(entry),
                Tier::Second => plan.second_choice.push(entry),
                Tier::Alternative => plan.alternative_antibiotic.push(entry),
            }
        }
        progress.report(Stage::Synthesize, 100, None).await;

        // ICD transform: resolve severity codes to diagnosis names.
        progress
            .report(Stage::IcdTransform, 50, Some("Resolving severity codes...".into()))
            .await;
        let icd_transformation: Vec<IcdTransformation> = input
            .severity_codes
            .iter()
            .map(|code| IcdTransformation {
                code: code.clone(),
                name: icd_name(code)
                    .unwrap_or("Unrecognized diagnosis code")
                    .to_string(),
            })
            .collect();
        progress.report(Stage::IcdTransform, 100, None).await;

        // Enrichment: final considerations and negative findings.
        progress
            .report(Stage::Enrichment, 50, Some("Enriching recommendations...".into()))
            .await;
        let result = PipelineResult {
            input_parameters: input.clone(),
            extraction_date: Utc::now().to_rfc3339(),
            result: AnalysisResult {
                antibiotic_therapy_plan: plan,
                pharmacist_analysis_on_resistant_gene: gene_entries,
            },
            icd_transformation,
            negative_organisms,
            negative_resistance_genes: negative_genes,
        };
        progress.report(Stage::Enrichment, 100, None).await;

        Ok(result)
    }

    fn name(&self) -> &str {
        "reference"
    }
}

/// Fixed-dose combination products in the reference set.
const COMBINATION_AGENTS: &[&str] = &["Piperacillin-tazobactam", "Trimethoprim-sulfamethoxazole"];

fn to_entry(candidate: &Candidate) -> AntibioticEntry {
    let row = candidate.row;
    AntibioticEntry {
        medical_name: row.agent.to_string(),
        coverage_for: Some(candidate.coverage.join(", ")),
        route_of_administration: Some(row.route.to_string()),
        dose_duration: Some(row.dose_duration.to_string()),
        renal_adjustment: row.renal_adjustment.map(str::to_string),
        general_considerations: row.considerations.map(str::to_string),
        is_combined: COMBINATION_AGENTS.contains(&row.agent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molecular_pipeline_core::progress::NullSink;
    use molecular_pipeline_core::PathogenEntry;

    fn input(pathogens: &[&str], genes: &[&str], allergy: Option<Vec<String>>) -> PipelineInput {
        PipelineInput {
            pathogens: pathogens
                .iter()
                .map(|p| PathogenEntry {
                    pathogen_name: (*p).to_string(),
                    pathogen_count: "high".to_string(),
                })
                .collect(),
            resistant_genes: genes.iter().map(|g| (*g).to_string()).collect(),
            severity_codes: vec!["N39.0".to_string()],
            age: Some(60),
            panel: None,
            systemic: None,
            allergy,
        }
    }

    #[tokio::test]
    async fn known_organism_yields_tiered_plan() {
        let engine = ReferenceEngine::new();
        let result = engine
            .run(&input(&["Escherichia coli"], &[], None), &NullSink)
            .await
            .unwrap();

        let plan = &result.result.antibiotic_therapy_plan;
        assert!(plan.first_choice.iter().any(|e| e.medical_name == "Nitrofurantoin"));
        assert!(!plan.second_choice.is_empty());
        assert!(result.negative_organisms.is_empty());
        assert_eq!(result.icd_transformation[0].name, "Urinary tract infection, site not specified");
    }

    #[tokio::test]
    async fn resistance_gene_excludes_affected_class() {
        let engine = ReferenceEngine::new();
        let result = engine
            .run(&input(&["Escherichia coli"], &["CTX-M"], None), &NullSink)
            .await
            .unwrap();

        let plan = &result.result.antibiotic_therapy_plan;
        let all: Vec<&str> = plan
            .first_choice
            .iter()
            .chain(&plan.second_choice)
            .chain(&plan.alternative_antibiotic)
            .map(|e| e.medical_name.as_str())
            .collect();
        assert!(!all.contains(&"Ceftriaxone"), "cephalosporin not excluded: {all:?}");
        assert_eq!(
            result.result.pharmacist_analysis_on_resistant_gene[0]
                .potential_medication_class_affected
                .as_deref(),
            Some("cephalosporins")
        );
    }

    #[tokio::test]
    async fn allergy_excludes_class() {
        let engine = ReferenceEngine::new();
        let result = engine
            .run(
                &input(
                    &["Pseudomonas aeruginosa"],
                    &[],
                    Some(vec!["penicillins".to_string()]),
                ),
                &NullSink,
            )
            .await
            .unwrap();

        let plan = &result.result.antibiotic_therapy_plan;
        assert!(plan.first_choice.is_empty(), "piperacillin should be excluded");
        assert!(plan.second_choice.iter().any(|e| e.medical_name == "Cefepime"));
    }

    #[tokio::test]
    async fn unknown_organism_alone_fails_the_run() {
        let engine = ReferenceEngine::new();
        let err = engine
            .run(&input(&["Proteus hauseri"], &[], None), &NullSink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no reference data"));
    }

    #[tokio::test]
    async fn unknown_organism_beside_a_known_one_is_a_negative_finding() {
        let engine = ReferenceEngine::new();
        let result = engine
            .run(
                &input(&["Escherichia coli", "Proteus hauseri"], &["novelA"], None),
                &NullSink,
            )
            .await
            .unwrap();
        assert_eq!(result.negative_organisms, vec!["Proteus hauseri"]);
        assert_eq!(result.negative_resistance_genes, vec!["novelA"]);
    }

    #[tokio::test]
    async fn duplicate_agents_are_merged_across_organisms() {
        let engine = ReferenceEngine::new();
        let result = engine
            .run(
                &input(&["Escherichia coli", "Klebsiella pneumoniae"], &[], None),
                &NullSink,
            )
            .await
            .unwrap();

        let plan = &result.result.antibiotic_therapy_plan;
        let ceftriaxone: Vec<&AntibioticEntry> = plan
            .first_choice
            .iter()
            .chain(&plan.second_choice)
            .filter(|e| e.medical_name == "Ceftriaxone")
            .collect();
        assert_eq!(ceftriaxone.len(), 1, "Ceftriaxone should appear once");
        let coverage = ceftriaxone[0].coverage_for.as_deref().unwrap();
        assert!(coverage.contains("Escherichia coli") && coverage.contains("Klebsiella"));
    }

    #[tokio::test]
    async fn progress_reports_are_monotonic_over_a_run() {
        use async_trait::async_trait;
        use std::sync::Mutex;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<u8>>);

        #[async_trait]
        impl ProgressSink for Recorder {
            async fn report(&self, stage: Stage, sub: u8, _message: Option<String>) {
                self.0.lock().unwrap().push(stage.overall_progress(sub));
            }
        }

        let engine = ReferenceEngine::new();
        let recorder = Recorder::default();
        engine
            .run(&input(&["Staphylococcus aureus"], &["mecA"], None), &recorder)
            .await
            .unwrap();

        let seen = recorder.0.into_inner().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "regressed: {seen:?}");
        assert_eq!(*seen.last().unwrap(), 100);
    }
}
