//! Revision log ingestion
//!
//! `jj log` is rendered through a template that prefixes each commit with
//! marker-separated metadata. The output is parsed incrementally as chunks
//! arrive, batched through a debouncer and delivered per request generation.

mod debounce;
mod parser;
mod stream;

pub use debounce::{BatchDebouncer, BatchState, Clock, ManualClock, SystemClock};
pub use parser::{parse_log_output, strip_ansi, LogLineParser};
pub use stream::{LogCallbacks, LogPage, LogRequests, LogSession, StreamHandle, StreamOptions};

use crate::error::JjError;
use serde::Serialize;
use thiserror::Error;

/// Separator between template fields. Chosen to never occur in jj output.
pub const MARKER: &str = "__LJ__";

/// Number of marker-prefixed fields in a header line (the gutter precedes them).
pub const FIELD_COUNT: usize = 13;

/// A revision as shown in the log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub change_id: String,
    pub commit_id: String,
    pub description: String,
    pub author: String,
    pub author_email: String,
    pub timestamp: String,
    pub bookmarks: Vec<String>,
    pub is_working_copy: bool,
    pub immutable: bool,
    pub empty: bool,
    pub divergent: bool,
    pub git_head: bool,
    pub working_copies: Vec<String>,
    /// Rendered graph lines, ANSI styling preserved
    pub display_lines: Vec<String>,
}

impl Commit {
    /// The id to use as a revset for this commit.
    ///
    /// A divergent change id names several commits, so the commit id is used.
    pub fn revision_id(&self) -> &str {
        if self.divergent {
            &self.commit_id
        } else {
            &self.change_id
        }
    }
}

/// One page request against the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub revset: Option<String>,
    pub limit: usize,
}

impl LogQuery {
    pub fn new(limit: usize) -> Self {
        Self { revset: None, limit }
    }

    pub fn with_revset(mut self, revset: impl Into<String>) -> Self {
        self.revset = Some(revset.into());
        self
    }

    /// Arguments for `jj`. One extra revision is requested to learn whether
    /// another page exists.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "log".to_string(),
            "--color".to_string(),
            "always".to_string(),
            "--ignore-working-copy".to_string(),
            "--template".to_string(),
            log_template(),
            "--limit".to_string(),
            (self.limit + 1).to_string(),
        ];
        if let Some(revset) = &self.revset {
            args.push("-r".to_string());
            args.push(revset.clone());
        }
        args
    }
}

/// The `jj log` template: thirteen marker-prefixed fields, the last being the
/// compact log rendering whose first line becomes the commit's first display line.
///
/// Ids are printed in full so they match what `jj log -T change_id` reports
/// for a revset; the compact rendering carries the short forms for display.
pub fn log_template() -> String {
    let fields = [
        "change_id",
        "commit_id",
        r#"if(immutable, "true", "false")"#,
        r#"if(empty, "true", "false")"#,
        r#"if(divergent, "true", "false")"#,
        "description.first_line()",
        "author.name()",
        "author.email()",
        r#"author.timestamp().local().format("%Y-%m-%d %H:%M:%S")"#,
        r#"bookmarks.map(|b| b.name()).join(",")"#,
        r#"if(git_head, "true", "false")"#,
        "working_copies",
        "builtin_log_compact",
    ];
    debug_assert_eq!(fields.len(), FIELD_COUNT);

    fields
        .iter()
        .map(|field| format!("\"{MARKER}\" ++ {field}"))
        .collect::<Vec<_>>()
        .join(" ++ ")
}

/// Failure of a log stream
#[derive(Debug, Error)]
pub enum LogError {
    #[error("the working copy is stale; run `jj workspace update-stale`")]
    StaleWorkingCopy { stderr: String },

    #[error("`jj log` exited with status {code}: {stderr}")]
    Command { code: i32, stderr: String },

    #[error(transparent)]
    Jj(#[from] JjError),
}

impl LogError {
    pub fn is_stale_working_copy(&self) -> bool {
        match self {
            LogError::StaleWorkingCopy { .. } => true,
            LogError::Jj(err) => err.is_stale_working_copy(),
            LogError::Command { .. } => false,
        }
    }
}

/// Build a header line the way the log template renders one.
#[cfg(test)]
pub(crate) fn header_line(gutter: &str, change: &str, description: &str, bookmarks: &str) -> String {
    let commit_id = format!("{change}0c0ffee");
    let reference = format!("{change} Ada 2024-05-01 {bookmarks}");
    let fields: [&str; FIELD_COUNT] = [
        change,
        &commit_id,
        "false",
        "false",
        "false",
        description,
        "Ada",
        "ada@example.com",
        "2024-05-01 10:00:00",
        bookmarks,
        "false",
        "",
        &reference,
    ];
    let mut line = gutter.to_string();
    for field in fields {
        line.push_str(MARKER);
        line.push_str(field);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_has_all_fields() {
        let template = log_template();
        assert_eq!(template.matches(MARKER).count(), FIELD_COUNT);
        assert!(template.ends_with("builtin_log_compact"));
    }

    #[test]
    fn test_template_ids_are_full() {
        let template = log_template();
        let fields: Vec<&str> = template.split(" ++ ").collect();
        assert_eq!(fields[1], "change_id");
        assert_eq!(fields[3], "commit_id");
        assert!(!template.contains("_id.short()"));
    }

    #[test]
    fn test_query_requests_one_extra() {
        let args = LogQuery::new(50).with_revset("trunk()..@").args();
        let limit = args.iter().position(|a| a == "--limit").unwrap();
        assert_eq!(args[limit + 1], "51");
        assert_eq!(&args[args.len() - 2..], ["-r", "trunk()..@"]);
        assert!(args.contains(&"--ignore-working-copy".to_string()));
    }

    #[test]
    fn test_revision_id_prefers_commit_for_divergent() {
        let mut commit = Commit {
            change_id: "kxqp".into(),
            commit_id: "1a2b".into(),
            ..Default::default()
        };
        assert_eq!(commit.revision_id(), "kxqp");
        commit.divergent = true;
        assert_eq!(commit.revision_id(), "1a2b");
    }
}
