//! Console, markdown and JSON renderings of a reconciliation run.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;
use xref_core::{Diagnostic, LinkKind, ReconciledRow};

use crate::{Inspection, ReconcileReport, ReconcileSummary};

const COLUMNS: [(&str, usize); 6] = [
    ("Linear", 13),
    ("Status", 10),
    ("Title", 40),
    ("GitHub", 10),
    ("Status", 10),
    ("Title", 40),
];

/// Cuts `text` to at most `width` characters, ending in `...` when shortened.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width <= 3 {
        return ".".repeat(width);
    }
    let mut out: String = text.chars().take(width - 3).collect();
    out.push_str("...");
    out
}

fn row_cells(row: &ReconciledRow) -> [String; 6] {
    [
        row.primary.identifier.clone(),
        row.primary.status.clone(),
        row.primary.title.clone(),
        format!("#{}", row.secondary.number),
        row.secondary.status.clone(),
        row.secondary.title.clone(),
    ]
}

fn table_line(cells: &[String]) -> String {
    cells
        .iter()
        .zip(COLUMNS)
        .map(|(cell, (_, width))| format!("{:<width$}", truncate(cell, width)))
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end()
        .to_string()
}

pub fn render_table(rows: &[ReconciledRow]) -> String {
    let header: Vec<String> = COLUMNS.iter().map(|(name, _)| name.to_string()).collect();
    let rule: Vec<String> = COLUMNS.iter().map(|(_, width)| "-".repeat(*width)).collect();

    let mut lines = vec![table_line(&header), table_line(&rule)];
    lines.extend(rows.iter().map(|row| table_line(&row_cells(row))));
    if rows.is_empty() {
        lines.push("(no rows)".to_string());
    }
    lines.join("\n")
}

pub fn render_summary(summary: &ReconcileSummary) -> String {
    [
        format!("- Group: {}", summary.group),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Records scanned: {}", summary.records_scanned),
        format!("- Records with links: {}", summary.records_with_links),
        format!("- Links attempted: {}", summary.links_attempted),
        format!("- Rows resolved: {}", summary.rows_resolved),
        format!("- Rows shown: {}", summary.rows_shown),
        format!("- Rate-limit hits: {}", summary.rate_limit_hits),
        format!("- Diagnostics: {}", summary.diagnostics),
    ]
    .join("\n")
}

fn md_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn diagnostic_line(diagnostic: &Diagnostic) -> String {
    let mut line = format!(
        "- {} -> {} ({}, {} attempt{}, found in {})",
        diagnostic.primary.identifier,
        diagnostic.link,
        diagnostic.outcome,
        diagnostic.attempts,
        if diagnostic.attempts == 1 { "" } else { "s" },
        diagnostic.link.provenance.source,
    );
    if let Some(detail) = &diagnostic.detail {
        line.push_str(&format!(": {detail}"));
    }
    line
}

pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(diagnostic_line)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_markdown(report: &ReconcileReport) -> String {
    let mut lines = vec![
        format!("# Linear/GitHub status report: {}", report.summary.group),
        String::new(),
        format!(
            "Generated {} (run `{}`)",
            report.summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            report.summary.run_id
        ),
        String::new(),
        "| Linear | Status | Title | GitHub | Status | Title |".to_string(),
        "|---|---|---|---|---|---|".to_string(),
    ];
    for row in &report.rows {
        lines.push(format!(
            "| {} | {} | {} | [#{}]({}) | {} | {} |",
            md_cell(&row.primary.identifier),
            md_cell(&row.primary.status),
            md_cell(&row.primary.title),
            row.secondary.number,
            row.secondary.url,
            md_cell(&row.secondary.status),
            md_cell(&row.secondary.title),
        ));
    }

    lines.push(String::new());
    lines.push("## Summary".to_string());
    lines.push(String::new());
    lines.push(render_summary(&report.summary));

    if !report.diagnostics.is_empty() {
        lines.push(String::new());
        lines.push("## Diagnostics".to_string());
        lines.push(String::new());
        lines.push(render_diagnostics(&report.diagnostics));
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn render_json(report: &ReconcileReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("serializing reconciliation report")
}

pub fn render_inspection(inspection: &Inspection) -> String {
    let record = &inspection.record;
    let mut lines = vec![
        format!("{}: {}", record.identifier, record.title),
        format!("Status: {}", record.status),
    ];
    if let Some(assignee) = &record.assignee {
        lines.push(format!("Assignee: {}", assignee.name));
    }
    if !record.labels.is_empty() {
        lines.push(format!("Labels: {}", record.labels.join(", ")));
    }
    lines.push(format!("Attachments: {}", record.attachments.len()));
    for attachment in &record.attachments {
        match &attachment.title {
            Some(title) => lines.push(format!("  - {} ({title})", attachment.url)),
            None => lines.push(format!("  - {}", attachment.url)),
        }
    }

    lines.push(String::new());
    if inspection.links.is_empty() {
        lines.push("No GitHub links found.".to_string());
    }
    for inspected in &inspection.links {
        let link = &inspected.link;
        let resolution = &inspected.resolution;
        lines.push(format!(
            "{link} [{}] via {}: {}",
            match link.kind {
                LinkKind::Issue => "issue",
                LinkKind::PullRequest => "pull",
            },
            link.provenance.source,
            link.provenance.matched
        ));
        match &resolution.details {
            Some(secondary) => lines.push(format!(
                "  {} | {} | {}",
                secondary.status, secondary.title, secondary.url
            )),
            None => lines.push(format!(
                "  {} after {} attempt(s){}",
                resolution.outcome,
                resolution.attempts,
                resolution
                    .detail
                    .as_ref()
                    .map(|d| format!(": {d}"))
                    .unwrap_or_default()
            )),
        }
    }
    lines.join("\n")
}

/// Writes JSON when `path` ends in `.json`, markdown otherwise.
pub async fn write_report(report: &ReconcileReport, path: &Path) -> Result<()> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let body = if is_json {
        render_json(report)?
    } else {
        render_markdown(report)
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, body)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;
    use xref_core::{
        CandidateLink, LinkKind, PrimarySummary, Provenance, ProvenanceSource, ResolveOutcome,
        ResolvedSecondary,
    };

    fn sample() -> ReconcileReport {
        let at = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let primary = PrimarySummary {
            identifier: "TEAM-3".into(),
            title: "Crash when the | pipe shows up in a really rather long title".into(),
            status: "Done".into(),
        };
        ReconcileReport {
            summary: ReconcileSummary {
                run_id: Uuid::nil(),
                group: "Team".into(),
                started_at: at,
                finished_at: at,
                records_scanned: 3,
                records_with_links: 2,
                links_attempted: 2,
                rows_resolved: 1,
                rows_shown: 1,
                rate_limit_hits: 0,
                diagnostics: 1,
            },
            rows: vec![ReconciledRow {
                primary: primary.clone(),
                secondary: ResolvedSecondary {
                    id: 77,
                    number: 5,
                    title: "Crash on pipe".into(),
                    status: "open".into(),
                    url: "https://github.com/org/x/issues/5".into(),
                },
                repository: "org/x".into(),
            }],
            diagnostics: vec![Diagnostic {
                primary: PrimarySummary {
                    identifier: "TEAM-9".into(),
                    ..primary
                },
                link: CandidateLink {
                    repository: "org/x".into(),
                    number: 9999,
                    kind: LinkKind::Issue,
                    provenance: Provenance {
                        source: ProvenanceSource::AttachmentUrl,
                        matched: "github.com/org/x/issues/9999".into(),
                    },
                },
                outcome: ResolveOutcome::NotFound,
                attempts: 1,
                detail: None,
            }],
        }
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("this is too long", 10), "this is...");
        assert_eq!(truncate("ünïcödé text", 8), "ünïcö...");
        assert_eq!(truncate("abcdef", 2), "..");
    }

    #[test]
    fn table_has_header_rule_and_truncated_cells() {
        let report = sample();
        let table = render_table(&report.rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Linear        Status"));
        assert!(lines[1].starts_with(&"-".repeat(13)));
        assert!(lines[2].starts_with("TEAM-3        Done       Crash when the | pipe shows up in a r..."));
        assert!(lines[2].contains("#5"));
    }

    #[test]
    fn empty_table_says_so() {
        assert!(render_table(&[]).ends_with("(no rows)"));
    }

    #[test]
    fn markdown_links_secondary_and_lists_diagnostics() {
        let md = render_markdown(&sample());
        assert!(md.contains("[#5](https://github.com/org/x/issues/5)"));
        assert!(md.contains("Crash when the \\| pipe"));
        assert!(md.contains("- Records scanned: 3"));
        assert!(md.contains("## Diagnostics"));
        assert!(md.contains("- TEAM-9 -> org/x#9999 (not_found, 1 attempt, found in attachment url)"));
    }

    #[tokio::test]
    async fn output_format_follows_extension() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample();

        let json_path = dir.path().join("out").join("report.json");
        write_report(&report, &json_path).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["summary"]["rows_resolved"], 1);
        assert_eq!(value["diagnostics"][0]["outcome"], "not_found");

        let md_path = dir.path().join("report.md");
        write_report(&report, &md_path).await.unwrap();
        let md = std::fs::read_to_string(&md_path).unwrap();
        assert!(md.starts_with("# Linear/GitHub status report: Team"));
    }
}
