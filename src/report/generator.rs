//! Markdown and JSON report generation.
//!
//! This module renders a finished [`Report`] either as a Markdown document
//! for people or as the JSON response document for tools.

use crate::models::{HexagonView, Information, Report, ReportMetadata, WeightVector};
use anyhow::Result;
use serde_json::{Map, Value};

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!("# Site Evaluation: {}\n\n", report.metadata.location));

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Summary
    output.push_str("## Summary\n\n");
    output.push_str(&report.body.response);
    output.push_str("\n\n");

    // Weights
    if let Some(ref weights) = report.body.weights {
        output.push_str(&generate_weights_section(weights));
    }

    // Ranking table and per-hexagon metrics
    output.push_str(&generate_ranking_section(report));
    output.push_str(&generate_hexagons_section(report));

    // Risk narrative
    if let Some(ref information) = report.body.information {
        output.push_str(&generate_information_section(information));
    }

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Location:** {}\n", metadata.location));
    section.push_str(&format!(
        "- **Evaluation Date:** {}\n",
        metadata.evaluation_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Weights From:** `{}`\n", metadata.weights_source));
    section.push_str(&format!(
        "- **Hexagons Scored:** {}\n",
        metadata.hexagons_scored
    ));
    for (table, count) in &metadata.table_counts {
        section.push_str(&format!("- **Rows in `{}`:** {}\n", table, count));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the weights section.
fn generate_weights_section(weights: &WeightVector) -> String {
    let mut section = String::new();

    section.push_str("## Weights\n\n");
    section.push_str("| Grid | Network | Temperature |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {:.2} | {:.2} | {:.2} |\n\n",
        weights.grid(),
        weights.network(),
        weights.temperature()
    ));

    section
}

/// Generate the ranking table.
fn generate_ranking_section(report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Ranking\n\n");

    if report.ranking.is_empty() {
        section.push_str("No hexagons were highlighted.\n\n");
        return section;
    }

    section.push_str("| # | Hexagon | Place | Score | Raw | Grid | Network | Temperature |\n");
    section.push_str("|:---:|:---|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for id in &report.ranking {
        let Some(view) = report.body.hexagons.get(id) else {
            continue;
        };
        section.push_str(&format!(
            "| {} | `{}` | {} | {:.2} | {:.3} | {} | {} | {} |\n",
            view.rank,
            id,
            view.place.as_deref().unwrap_or("-"),
            view.normalized_composite,
            view.raw_composite,
            format_sub_score(view.sub_scores.grid),
            format_sub_score(view.sub_scores.network),
            format_sub_score(view.sub_scores.temperature),
        ));
    }
    section.push('\n');

    section
}

fn format_sub_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.2}", s),
        None => "n/a".to_string(),
    }
}

/// Generate the per-hexagon metrics.
fn generate_hexagons_section(report: &Report) -> String {
    if report.ranking.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Hexagon Details\n\n");

    for id in &report.ranking {
        if let Some(view) = report.body.hexagons.get(id) {
            section.push_str(&generate_hexagon_block(id, view));
        }
    }

    section
}

/// Generate the block for a single hexagon.
fn generate_hexagon_block(id: &str, view: &HexagonView) -> String {
    let mut block = String::new();

    match view.place {
        Some(ref place) => block.push_str(&format!("### {}. {} (`{}`)\n\n", view.rank, place, id)),
        None => block.push_str(&format!("### {}. `{}`\n\n", view.rank, id)),
    }

    block.push_str(&format!(
        "*Score: {:.2} | Raw: {:.3}*\n\n",
        view.normalized_composite, view.raw_composite
    ));

    for (label, fields) in [
        ("Grid", &view.grid),
        ("Network", &view.network),
        ("Temperature", &view.temperature),
    ] {
        block.push_str(&format!("**{}:** {}\n\n", label, format_fields(fields)));
    }

    if let Some(ref details) = view.details {
        block.push_str("<details>\n<summary>Full data</summary>\n\n");
        for (key, value) in details {
            block.push_str(&format!("- `{}`: {}\n", key, value));
        }
        block.push_str("\n</details>\n\n");
    }

    block.push_str("---\n\n");

    block
}

fn format_fields(fields: &Map<String, Value>) -> String {
    if fields.is_empty() {
        return "no data".to_string();
    }

    fields
        .iter()
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generate the risk narrative section.
fn generate_information_section(information: &Information) -> String {
    let mut section = String::new();

    section.push_str("## Risks\n\n");

    if information.is_empty() {
        section.push_str("The research agent found no sourced risks.\n\n");
        return section;
    }

    for (title, entries) in [
        ("Legislation", &information.legislation),
        ("Construction Opposition", &information.construction_opposition),
        ("Environmental Challenges", &information.environmental_challenges),
    ] {
        if entries.is_empty() {
            continue;
        }
        section.push_str(&format!("### {}\n\n", title));
        for entry in entries {
            section.push_str(&format!("- {}\n", entry));
        }
        section.push('\n');
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by hexsite v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
