//! Markdown activity report rendered from the stored metrics.

use chrono::{DateTime, Utc};
use ghdata_core::Metrics;

pub fn render_markdown(metrics: &Metrics, generated_at: DateTime<Utc>) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("# GitHub Activity Report".to_string());
    lines.push(String::new());
    lines.push(format!(
        "Generated: **{}**",
        generated_at.format("%Y-%m-%d %H:%M:%SZ")
    ));
    lines.push(String::new());
    lines.push("## Overview".to_string());
    lines.push(String::new());
    lines.push(format!(
        "- Total items in issues table: **{}**",
        metrics.total
    ));
    lines.push(format!(
        "- Issues: **open {}**, **closed {}**",
        metrics.issues_open, metrics.issues_closed
    ));
    lines.push(format!(
        "- PRs: **open {}**, **closed {}**",
        metrics.prs_open, metrics.prs_closed
    ));
    lines.push(String::new());
    lines.push("## Top Repos by Open Issues".to_string());
    lines.push(String::new());
    lines.push("| Repo Full Name | Open Issues |".to_string());
    lines.push("| --- | ---: |".to_string());
    for repo in &metrics.top_open_issues {
        lines.push(format!(
            "| {} | {} |",
            escape_cell(&repo.full_name),
            repo.open_issues
        ));
    }
    lines.push(String::new());

    lines.join("\n")
}

// Pipes would split the table cell
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
