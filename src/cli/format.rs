//! Output formatting for CLI display.

use crate::compat::{CompatibilityReport, CompatibilityStatus, IssueSource, UpdateStatus};
use crate::diff::ElementChange;
use crate::model::{CommitInfo, Element, WorkflowRunStatus};
use crate::session::DocumentSource;
use crate::storage::Marker;

pub(super) fn format_source(source: &DocumentSource) -> String {
    match source {
        DocumentSource::Remote { revision } => format!("repository at {}", short(revision)),
        DocumentSource::Fallback {
            revision: Some(revision),
        } => format!("bundled document (list missing at {})", short(revision)),
        DocumentSource::Fallback { revision: None } => {
            "bundled document (repository unreachable, read-only)".to_string()
        }
    }
}

pub(super) fn format_workflow_status(status: &WorkflowRunStatus) -> String {
    let Some(run) = &status.latest_run else {
        return "no deploy runs".to_string();
    };
    let state = if status.is_running {
        format!("running ({})", run.status)
    } else {
        match &run.conclusion {
            Some(conclusion) => format!("idle, last run {conclusion}"),
            None => format!("idle, last run {}", run.status),
        }
    };
    format!(
        "{state}\n{} #{} at {}\n{}",
        run.workflow_name, run.id, run.created_at, run.html_url
    )
}

pub(super) fn format_element_change(change: &ElementChange) -> String {
    match change {
        ElementChange::Added(key) => format!("+ {key}"),
        ElementChange::Removed(key) => format!("- {key}"),
        ElementChange::Modified(key) => format!("~ {key}"),
        ElementChange::Moved(key) => format!("> {key} (moved)"),
    }
}

/// One element per line: label, key when it differs, and tags.
pub(super) fn format_element(element: &Element, marker: Option<Marker>) -> String {
    let mut line = match marker {
        Some(Marker::Cross) => format!("x {}", element.label()),
        Some(Marker::Highlight) => format!("* {}", element.label()),
        Some(Marker::Hide) | None => format!("  {}", element.label()),
    };
    if let Some(key) = element.key()
        && key != element.label()
    {
        line.push_str(&format!(" [{key}]"));
    }
    if !element.tags.is_empty() {
        line.push_str(&format!("  ({})", element.tags.join(", ")));
    }
    line
}

pub(super) fn format_commit(commit: &CommitInfo) -> String {
    let subject = commit.message.lines().next().unwrap_or_default();
    match &commit.date {
        Some(date) => format!("{}  {date}  {subject}", commit.short_sha()),
        None => format!("{}  {subject}", commit.short_sha()),
    }
}

pub(super) fn format_report(report: &CompatibilityReport) -> String {
    let mut out = match &report.status {
        CompatibilityStatus::Compatible => format!("{}: compatible", report.target),
        CompatibilityStatus::Incompatible => {
            format!("{}: not compatible ({})", report.target, report.summary())
        }
        CompatibilityStatus::Unsupported { .. } | CompatibilityStatus::SchemaMissing => {
            format!("{}: {}", report.target, report.summary())
        }
    };
    if let Some(path) = &report.schema_path {
        out.push_str(&format!("\nschema: {path}"));
    }
    if !report.issues.is_empty() {
        let source = match report.issue_source {
            Some(IssueSource::Yaml) => "yaml",
            _ => "schema",
        };
        out.push_str(&format!("\n{source} issues:"));
        for issue in &report.issues {
            out.push_str(&format!("\n  {issue}"));
        }
        let hidden = report.total_issues - report.issues.len();
        if hidden > 0 {
            out.push_str(&format!("\n  ... and {hidden} more"));
        }
    }
    out
}

pub(super) fn format_update(status: &UpdateStatus) -> String {
    if !status.update_available {
        return format!("{} is the latest release", status.current);
    }
    let mut out = format!("update available: {} -> {}", status.current, status.latest);
    if status.dismissed {
        out.push_str(" (dismissed)");
    }
    out
}

fn short(revision: &str) -> &str {
    revision.get(..7).unwrap_or(revision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_line_shows_key_and_tags() {
        let element = Element {
            id: Some("serde".into()),
            name: Some("Serde".into()),
            tags: vec!["serialization".into()],
            ..Element::default()
        };
        assert_eq!(
            format_element(&element, Some(Marker::Highlight)),
            "* Serde [serde]  (serialization)"
        );

        let legacy = Element {
            name: Some("tokio".into()),
            ..Element::default()
        };
        assert_eq!(format_element(&legacy, None), "  tokio");
    }

    #[test]
    fn source_uses_short_revision() {
        let source = DocumentSource::Remote {
            revision: "0123456789abcdef".into(),
        };
        assert_eq!(format_source(&source), "repository at 0123456");
    }

    #[test]
    fn report_lists_hidden_issues() {
        let report = CompatibilityReport {
            target: "v2.0.0".into(),
            status: CompatibilityStatus::Incompatible,
            issues: vec!["title: Required".into()],
            total_issues: 3,
            issue_source: Some(IssueSource::Schema),
            schema_path: Some("schema.json".into()),
            example: None,
        };
        assert_eq!(
            format_report(&report),
            "v2.0.0: not compatible (3 schema issues)\n\
             schema: schema.json\n\
             schema issues:\n  title: Required\n  ... and 2 more"
        );
    }
}
