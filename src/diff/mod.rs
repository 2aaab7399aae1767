//! Diff model
//!
//! Parses `jj diff --git` output into files, hunks and lines, indexes hunks
//! with run-scoped ids, computes word diffs for single-line edits and flattens
//! everything into rows a viewport can address directly.

mod index;
mod parse;
mod rows;
mod word;

pub use index::{build_hunk_index, context_lines, HunkIndexEntry, MAX_CONTEXT_LINES};
pub use parse::parse_diff;
pub use rows::{
    flatten, flatten_rows, line_number_width, max_line_number, slice_columns, visible_range,
    DiffRow, WrapCache, WrappedRow, TAB_WIDTH,
};
pub use word::{line_pairs, word_diff, LinePair, SegmentKind, WordDiff, WordDiffSegment};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

/// A file touched by the revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub name: String,
    /// Source path for renames and copies
    pub prev_name: Option<String>,
    pub change_type: ChangeType,
    pub additions: usize,
    pub deletions: usize,
    pub is_binary: bool,
    pub hunks: Vec<Hunk>,
}

impl DiffFile {
    fn new(name: String) -> Self {
        Self {
            name,
            prev_name: None,
            change_type: ChangeType::Modified,
            additions: 0,
            deletions: 0,
            is_binary: false,
            hunks: Vec::new(),
        }
    }

    /// Name for headers, showing the source of a rename or copy.
    pub fn display_name(&self) -> String {
        match &self.prev_name {
            Some(prev) if prev != &self.name => format!("{} → {}", prev, self.name),
            _ => self.name.clone(),
        }
    }
}

/// A hunk. `lines[0]` is always the `@@` header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub header: String,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// First line on the side that has content: new unless the hunk only deletes.
    pub fn start_line(&self) -> u32 {
        if self.new_count > 0 {
            self.new_start
        } else {
            self.old_start
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineKind {
    Context,
    Addition,
    Deletion,
    HunkHeader,
}

/// A single line in a diff.
///
/// Context lines carry both numbers, deletions only the old one, additions
/// only the new one, hunk headers neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub content: String,
    pub old_line_number: Option<u32>,
    pub new_line_number: Option<u32>,
}

impl DiffLine {
    pub fn prefix(&self) -> &'static str {
        match self.kind {
            LineKind::Addition => "+",
            LineKind::Deletion => "-",
            LineKind::Context => " ",
            LineKind::HunkHeader => "",
        }
    }
}
