//! Hunk index with run-scoped ids

use super::{DiffFile, Hunk, LineKind};

/// Context lines kept per hunk for fuzzy matching
pub const MAX_CONTEXT_LINES: usize = 5;

/// One hunk of the current diff, addressable by id.
///
/// Ids (`h1`, `h2`, ...) are only meaningful for the diff they were built
/// from; anything persisted must go through an anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkIndexEntry {
    pub id: String,
    pub file_path: String,
    pub file_index: usize,
    pub hunk_index: usize,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub context_lines: Vec<String>,
}

impl HunkIndexEntry {
    pub fn start_line(&self) -> u32 {
        if self.new_count > 0 {
            self.new_start
        } else {
            self.old_start
        }
    }
}

/// Number every hunk in file order, starting at `h1`.
pub fn build_hunk_index(files: &[DiffFile]) -> Vec<HunkIndexEntry> {
    files
        .iter()
        .enumerate()
        .flat_map(|(file_index, file)| {
            file.hunks
                .iter()
                .enumerate()
                .map(move |(hunk_index, hunk)| (file_index, file, hunk_index, hunk))
        })
        .enumerate()
        .map(|(n, (file_index, file, hunk_index, hunk))| HunkIndexEntry {
            id: format!("h{}", n + 1),
            file_path: file.name.clone(),
            file_index,
            hunk_index,
            old_start: hunk.old_start,
            old_count: hunk.old_count,
            new_start: hunk.new_start,
            new_count: hunk.new_count,
            context_lines: context_lines(hunk),
        })
        .collect()
}

/// The first unchanged lines of a hunk, trimmed.
pub fn context_lines(hunk: &Hunk) -> Vec<String> {
    hunk.lines
        .iter()
        .filter(|line| line.kind == LineKind::Context)
        .take(MAX_CONTEXT_LINES)
        .map(|line| line.content.trim().to_string())
        .collect()
}
