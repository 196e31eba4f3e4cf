// crates/core/src/report.rs
//! Printable report rendering for completed pipeline results.
//!
//! Produces a self-contained HTML document suitable for printing or
//! download. Rendering consumes the stored result JSON, so a malformed or
//! legacy payload surfaces [`ReportError`] to that request only; session
//! state is never touched by a render failure.

use thiserror::Error;

use crate::result::{AntibioticEntry, PipelineResult, ResistanceGeneEntry};

#[derive(Debug, Error)]
pub enum ReportError {
    /// The stored result document does not match the expected shape.
    #[error("result payload is not a renderable pipeline result: {0}")]
    Shape(#[from] serde_json::Error),

    /// The result has nothing to render.
    #[error("result contains no therapy plan entries")]
    EmptyPlan,
}

/// Render the printable report for a stored result document.
///
/// Accepts the raw JSON persisted on the session so callers can pass either
/// a freshly completed result or one read back from the store.
pub fn render_report_json(result: &serde_json::Value) -> Result<Vec<u8>, ReportError> {
    let result: PipelineResult = serde_json::from_value(result.clone())?;
    render_report(&result)
}

/// Render the printable report for a completed result.
pub fn render_report(result: &PipelineResult) -> Result<Vec<u8>, ReportError> {
    if result.result.antibiotic_therapy_plan.is_empty() {
        return Err(ReportError::EmptyPlan);
    }

    let mut html = String::with_capacity(16 * 1024);
    html.push_str(HEADER);

    html.push_str(&format!(
        "<h1>Antimicrobial Therapy Report</h1>\n<p class=\"meta\">Generated {}</p>\n",
        escape(&result.extraction_date)
    ));

    render_input_summary(&mut html, result);
    render_therapy_section(&mut html, result);
    render_resistance_section(
        &mut html,
        &result.result.pharmacist_analysis_on_resistant_gene,
    );
    render_negative_findings(&mut html, result);

    html.push_str(
        "<p class=\"footnote\">Automated analysis. Review by a clinical \
         pharmacist is required before use.</p>\n",
    );
    html.push_str("</body>\n</html>\n");
    Ok(html.into_bytes())
}

const HEADER: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
<title>Antimicrobial Therapy Report</title>\n<style>\n\
body { font-family: Helvetica, Arial, sans-serif; margin: 2em; color: #222; }\n\
h1 { font-size: 1.5em; border-bottom: 2px solid #336; padding-bottom: 0.3em; }\n\
h2 { font-size: 1.15em; color: #336; margin-top: 1.4em; }\n\
table { border-collapse: collapse; width: 100%; margin: 0.6em 0; }\n\
th, td { border: 1px solid #bbb; padding: 6px 8px; text-align: left; font-size: 0.9em; }\n\
th { background: #eef; }\n\
.meta { color: #666; font-size: 0.85em; }\n\
.footnote { margin-top: 2em; font-size: 0.8em; color: #888; }\n\
</style>\n</head>\n<body>\n";

fn render_input_summary(html: &mut String, result: &PipelineResult) {
    let input = &result.input_parameters;
    html.push_str("<h2>Panel Summary</h2>\n<table>\n");
    html.push_str("<tr><th>Organism</th><th>Reported count</th></tr>\n");
    for p in &input.pathogens {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            escape(&p.pathogen_name),
            escape(&p.pathogen_count)
        ));
    }
    html.push_str("</table>\n");

    if !result.icd_transformation.is_empty() {
        html.push_str("<table>\n<tr><th>Severity code</th><th>Diagnosis</th></tr>\n");
        for icd in &result.icd_transformation {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                escape(&icd.code),
                escape(&icd.name)
            ));
        }
        html.push_str("</table>\n");
    }

    if let Some(allergies) = input.allergy.as_deref().filter(|a| !a.is_empty()) {
        html.push_str(&format!(
            "<p><strong>Reported allergies:</strong> {}</p>\n",
            escape(&allergies.join(", "))
        ));
    }
}

fn render_therapy_section(html: &mut String, result: &PipelineResult) {
    let plan = &result.result.antibiotic_therapy_plan;
    let tiers: [(&str, &[AntibioticEntry]); 3] = [
        ("First Choice", &plan.first_choice),
        ("Second Choice", &plan.second_choice),
        ("Alternative Antibiotics", &plan.alternative_antibiotic),
    ];
    for (title, entries) in tiers {
        if entries.is_empty() {
            continue;
        }
        html.push_str(&format!("<h2>{title}</h2>\n<table>\n"));
        html.push_str(
            "<tr><th>Antibiotic</th><th>Coverage</th><th>Dose &amp; duration</th>\
             <th>Renal adjustment</th><th>Considerations</th></tr>\n",
        );
        for entry in entries {
            html.push_str(&format!(
                "<tr><td>{}{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&entry.medical_name),
                if entry.is_combined {
                    " (combination)"
                } else {
                    ""
                },
                escape(entry.coverage_for.as_deref().unwrap_or("—")),
                escape(&format_dose_duration(entry.dose_duration.as_deref())),
                escape(entry.renal_adjustment.as_deref().unwrap_or("—")),
                escape(
                    entry
                        .general_considerations
                        .as_deref()
                        .unwrap_or("No additional considerations")
                ),
            ));
        }
        html.push_str("</table>\n");
    }
}

fn render_resistance_section(html: &mut String, entries: &[ResistanceGeneEntry]) {
    if entries.is_empty() {
        return;
    }
    html.push_str("<h2>Resistance Gene Analysis</h2>\n<table>\n");
    html.push_str("<tr><th>Detected gene</th><th>Class affected</th><th>Considerations</th></tr>\n");
    for entry in entries {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(&entry.detected_resistant_gene_name),
            escape(
                entry
                    .potential_medication_class_affected
                    .as_deref()
                    .unwrap_or("—")
            ),
            escape(
                entry
                    .general_considerations
                    .as_deref()
                    .unwrap_or("No additional considerations")
            ),
        ));
    }
    html.push_str("</table>\n");
}

fn render_negative_findings(html: &mut String, result: &PipelineResult) {
    if result.negative_organisms.is_empty() && result.negative_resistance_genes.is_empty() {
        return;
    }
    html.push_str("<h2>Not Covered by This Analysis</h2>\n<ul>\n");
    for organism in &result.negative_organisms {
        html.push_str(&format!("<li>Organism: {}</li>\n", escape(organism)));
    }
    for gene in &result.negative_resistance_genes {
        html.push_str(&format!("<li>Resistance gene: {}</li>\n", escape(gene)));
    }
    html.push_str("</ul>\n");
}

/// Turn the stored `dose,route,frequency,duration` string into display text.
fn format_dose_duration(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "Not specified".to_string();
    };
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [dose, route, frequency, duration, ..] => {
            let mut out = format!("{dose} {route}");
            if !frequency.is_empty() && !frequency.eq_ignore_ascii_case("null") {
                out.push_str(&format!(", {frequency}"));
            }
            if !duration.is_empty() && !duration.eq_ignore_ascii_case("null") {
                out.push_str(&format!(" for {duration}"));
            }
            out
        }
        [dose, route, frequency] => {
            let mut out = format!("{dose} {route}");
            if !frequency.is_empty() && !frequency.eq_ignore_ascii_case("null") {
                out.push_str(&format!(", {frequency}"));
            }
            out
        }
        _ => raw.to_string(),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
