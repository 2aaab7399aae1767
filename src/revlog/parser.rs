//! Incremental parser for templated `jj log` output

use super::{Commit, FIELD_COUNT, MARKER};
use crate::error::is_stale_working_copy_diagnostic;
use regex::Regex;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*m").expect("static ANSI regex is valid")
});

/// Remove SGR escape sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Turns a stream of arbitrary text chunks into commits.
///
/// A commit is only handed out once the next header (or the end of input)
/// shows that its display lines are complete.
#[derive(Debug, Default)]
pub struct LogLineParser {
    partial: String,
    current: Option<Commit>,
    completed: Vec<Commit>,
    saw_stale: bool,
}

impl LogLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk. Complete lines are parsed, the remainder is carried.
    pub fn push(&mut self, chunk: &str) {
        self.partial.push_str(chunk);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return;
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        for line in complete.lines() {
            self.parse_line(line);
        }
    }

    /// End of input: parse the carried partial line and close the last commit.
    pub fn finish(&mut self) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.parse_line(line.trim_end_matches('\r'));
        }
        if let Some(commit) = self.current.take() {
            self.completed.push(commit);
        }
    }

    /// Commits completed since the last call, in output order.
    pub fn take_completed(&mut self) -> Vec<Commit> {
        std::mem::take(&mut self.completed)
    }

    /// Whether a non-header line was jj's stale working copy error.
    pub fn saw_stale_working_copy(&self) -> bool {
        self.saw_stale
    }

    fn parse_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        match parse_header(line) {
            Some(commit) => {
                if let Some(previous) = self.current.replace(commit) {
                    self.completed.push(previous);
                }
            }
            None => {
                if is_stale_working_copy_diagnostic(&strip_ansi(line)) {
                    self.saw_stale = true;
                }
                // continuation lines before the first header have no owner
                if let Some(commit) = self.current.as_mut() {
                    commit.display_lines.push(line.to_string());
                }
            }
        }
    }
}

/// Parse complete log output in one go.
pub fn parse_log_output(text: &str) -> Vec<Commit> {
    let mut parser = LogLineParser::new();
    parser.push(text);
    parser.finish();
    parser.take_completed()
}

fn parse_header(line: &str) -> Option<Commit> {
    let parts: Vec<&str> = line.split(MARKER).collect();
    if parts.len() != FIELD_COUNT + 1 {
        return None;
    }

    let gutter = parts[0];
    let field = |i: usize| strip_ansi(parts[i]);
    let flag = |i: usize| field(i) == "true";

    Some(Commit {
        change_id: field(1),
        commit_id: field(2),
        immutable: flag(3),
        empty: flag(4),
        divergent: flag(5),
        description: field(6),
        author: field(7),
        author_email: field(8),
        timestamp: field(9),
        bookmarks: split_names(&field(10)),
        git_head: flag(11),
        working_copies: split_names(&field(12)),
        is_working_copy: strip_ansi(gutter).contains('@'),
        display_lines: vec![format!("{}{}", gutter, parts[13])],
    })
}

/// Split a comma or whitespace separated name list. Workspace names rendered
/// by jj carry a trailing `@`, which is dropped.
fn split_names(field: &str) -> Vec<String> {
    field
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|name| name.trim().trim_end_matches('@'))
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
