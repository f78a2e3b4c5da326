//! Rendering of command results for stdout (`table` or `json`).

use std::fmt::Write as _;

use clap::ValueEnum;
use serde::Serialize;

use crate::discovery::DiscoveryReport;
use crate::error::{FleetError, Result};
use crate::orchestrator::BulkReport;
use crate::status::RepositoryStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Left-aligned columns padded to the widest cell, two spaces apart.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut line = |cells: Vec<&str>| {
        let rendered: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", rendered.join("  ").trim_end());
    };
    line(headers.to_vec());
    let rules: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    line(rules.iter().map(String::as_str).collect());
    for row in rows {
        line(row.iter().map(String::as_str).collect());
    }
    out
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| FleetError::Validation(format!("failed to serialise output: {e}")))
}

pub fn render_discovery(report: &DiscoveryReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(&report.rows()),
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = report
                .rows()
                .into_iter()
                .map(|row| {
                    vec![
                        row.organization,
                        row.project.unwrap_or_else(|| "-".to_string()),
                        row.repository,
                        row.default_branch,
                        if row.is_private { "private" } else { "public" }.to_string(),
                        row.clone_url,
                    ]
                })
                .collect();
            let mut out = render_table(
                &["ORGANIZATION", "PROJECT", "REPOSITORY", "BRANCH", "VISIBILITY", "CLONE URL"],
                &rows,
            );
            let _ = writeln!(out, "\n{} repositories found", rows.len());
            if report.limit_reached {
                let _ = writeln!(out, "(limit reached, more may exist)");
            }
            Ok(out)
        }
    }
}

pub fn render_status(statuses: &[RepositoryStatus], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(statuses),
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = statuses
                .iter()
                .map(|s| {
                    let state = match (&s.error, s.is_clean) {
                        (Some(_), _) => "error".to_string(),
                        (None, true) => "clean".to_string(),
                        (None, false) => format!(
                            "{} staged, {} modified, {} untracked",
                            s.staged_files, s.modified_files, s.untracked_files
                        ),
                    };
                    vec![
                        s.display_name(),
                        s.branch_name.clone().unwrap_or_else(|| "-".to_string()),
                        s.remote_branch.clone().unwrap_or_else(|| "-".to_string()),
                        format!("+{}/-{}", s.ahead_by, s.behind_by),
                        state,
                    ]
                })
                .collect();
            Ok(render_table(
                &["REPOSITORY", "BRANCH", "UPSTREAM", "AHEAD/BEHIND", "STATE"],
                &rows,
            ))
        }
    }
}

/// Closing summary of a bulk run, listing every failure with its reason.
pub fn render_bulk_summary(report: &BulkReport) -> String {
    use crate::orchestrator::RepoAction;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} repositories: {} cloned, {} recloned, {} pulled, {} skipped, {} failed",
        report.total(),
        report.count(RepoAction::Cloned),
        report.count(RepoAction::Recloned),
        report.count(RepoAction::Pulled),
        report.count(RepoAction::Skipped),
        report.failures.len()
    );
    if !report.failures.is_empty() {
        let _ = writeln!(out, "\nFailed:");
        for (name, e) in &report.failures {
            let _ = writeln!(out, "  {name}: {}", describe_failure(e));
        }
    }
    out
}

fn describe_failure(e: &FleetError) -> String {
    match e {
        FleetError::RepositoryOperation { reason, detail: Some(detail), .. } => {
            format!("{reason} ({detail})")
        }
        other => other.reason(),
    }
}
