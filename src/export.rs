//! Rendering comment listings
//!
//! Human-readable text for the terminal, or JSON for scripts and agents.

use crate::comments::{CommentAnchor, CommentEntry, RevisionReport};
use anyhow::Result;
use serde::Serialize;

/// Output format for `comment list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
}

/// Render reports as text, one block per revision.
pub fn export_text(reports: &[RevisionReport]) -> String {
    if reports.is_empty() {
        return "No comments found\n".to_string();
    }

    let mut output = String::new();
    for (n, report) in reports.iter().enumerate() {
        if n > 0 {
            output.push('\n');
        }
        output.push_str(&format!("{} - \"{}\"\n", report.change_id, report.description));

        for (id, thread) in &report.hunks {
            let stale = if thread.stale { " (stale)" } else { "" };
            output.push_str(&format!(
                "  {}{} {} lines {}\n",
                id,
                stale,
                thread.anchor.file_path,
                thread.anchor.line_range.display()
            ));
            for comment in &thread.comments {
                output.push_str(&format!(
                    "    {} ({}/{}) {}\n",
                    comment.id, comment.author, comment.kind, comment.text
                ));
            }
        }
    }
    output
}

/// Render reports as a JSON document.
pub fn export_json(reports: &[RevisionReport]) -> Result<String> {
    #[derive(Serialize)]
    struct ExportHunk<'a> {
        id: &'a str,
        stale: bool,
        anchor: &'a CommentAnchor,
        comments: &'a [CommentEntry],
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ExportRevision<'a> {
        change_id: &'a str,
        commit_id: &'a str,
        description: &'a str,
        hunks: Vec<ExportHunk<'a>>,
    }

    #[derive(Serialize)]
    struct Export<'a> {
        revisions: Vec<ExportRevision<'a>>,
    }

    let export = Export {
        revisions: reports
            .iter()
            .map(|report| ExportRevision {
                change_id: &report.change_id,
                commit_id: &report.commit_id,
                description: &report.description,
                hunks: report
                    .hunks
                    .iter()
                    .map(|(id, thread)| ExportHunk {
                        id,
                        stale: thread.stale,
                        anchor: &thread.anchor,
                        comments: &thread.comments,
                    })
                    .collect(),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&export).map_err(Into::into)
}

pub fn export(reports: &[RevisionReport], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Text => Ok(export_text(reports)),
        ExportFormat::Json => export_json(reports),
    }
}
