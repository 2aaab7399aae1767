//! Re-attaching comment threads after a revision's diff changed
//!
//! Each stored thread is matched, in stored order, against the unclaimed
//! hunks of the same file. The best candidate wins if it scores at least
//! `MATCH_THRESHOLD`; otherwise the thread is kept and marked stale.

use super::{CommentAnchor, HunkComments, RevisionComments};
use crate::diff::{build_hunk_index, DiffFile, HunkIndexEntry};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::info;

/// Minimum score for a candidate hunk to take over a thread
pub const MATCH_THRESHOLD: f64 = 0.4;

const CONTEXT_WEIGHT: f64 = 0.7;
const LINE_WEIGHT: f64 = 0.3;
/// Line distance at which proximity reaches zero
const LINE_WINDOW: f64 = 50.0;

/// Outcome of relocating one revision's threads
#[derive(Debug, Clone, PartialEq)]
pub struct Relocation {
    pub updated: RevisionComments,
    /// A thread moved to another id or changed stale state
    pub changed: bool,
}

/// Share of `b`'s lines found in `a`, over the longer list.
fn context_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let known: HashSet<&str> = a.iter().map(String::as_str).collect();
    let shared = b.iter().filter(|line| known.contains(line.as_str())).count();
    shared as f64 / a.len().max(b.len()) as f64
}

fn line_proximity(anchor: &CommentAnchor, candidate: &HunkIndexEntry) -> f64 {
    let delta = (f64::from(anchor.line_range.start()) - f64::from(candidate.start_line())).abs();
    1.0 - (delta / LINE_WINDOW).min(1.0)
}

/// How well `candidate` matches a stored anchor, in `[0, 1]`.
pub fn match_score(anchor: &CommentAnchor, candidate: &HunkIndexEntry) -> f64 {
    let lines = line_proximity(anchor, candidate);
    if anchor.context_lines.is_empty() || candidate.context_lines.is_empty() {
        return lines;
    }
    CONTEXT_WEIGHT * context_overlap(&anchor.context_lines, &candidate.context_lines)
        + LINE_WEIGHT * lines
}

/// Re-key every thread of `revision` against the hunks of `files`.
///
/// No thread is ever dropped. A stale thread keeps its stored id unless a
/// relocated thread now owns that id, in which case it moves to
/// `<id>-stale`.
pub fn relocate_revision(revision: &RevisionComments, files: &[DiffFile]) -> Relocation {
    let entries = build_hunk_index(files);
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut matches: Vec<Option<&HunkIndexEntry>> = Vec::with_capacity(revision.hunks.len());

    for thread in revision.hunks.values() {
        let mut best: Option<(&HunkIndexEntry, f64)> = None;
        for candidate in &entries {
            if candidate.file_path != thread.anchor.file_path || claimed.contains(candidate.id.as_str()) {
                continue;
            }
            let score = match_score(&thread.anchor, candidate);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((entry, score)) if score >= MATCH_THRESHOLD => {
                claimed.insert(entry.id.as_str());
                matches.push(Some(entry));
            }
            _ => matches.push(None),
        }
    }

    let mut hunks: IndexMap<String, HunkComments> = IndexMap::with_capacity(revision.hunks.len());
    let mut changed = false;

    for ((id, thread), matched) in revision.hunks.iter().zip(matches) {
        let mut thread = thread.clone();
        match matched {
            Some(entry) => {
                if entry.id != *id || thread.stale {
                    changed = true;
                }
                thread.anchor = CommentAnchor::from_entry(entry);
                thread.stale = false;
                hunks.insert(entry.id.clone(), thread);
            }
            None => {
                if !thread.stale {
                    changed = true;
                }
                thread.stale = true;
                let key = stale_key(id, &claimed, revision, &hunks);
                if key != *id {
                    changed = true;
                }
                hunks.insert(key, thread);
            }
        }
    }

    let stale = hunks.values().filter(|h| h.stale).count();
    if changed {
        info!(threads = hunks.len(), stale, "relocated comment threads");
    }

    Relocation {
        updated: RevisionComments {
            commit_hash: revision.commit_hash.clone(),
            hunks,
        },
        changed,
    }
}

fn stale_key(
    id: &str,
    claimed: &HashSet<&str>,
    revision: &RevisionComments,
    placed: &IndexMap<String, HunkComments>,
) -> String {
    let taken = |key: &str| {
        claimed.contains(key) || placed.contains_key(key) || (key != id && revision.hunks.contains_key(key))
    };
    if taken(id) {
        free_stale_key(id, taken)
    } else {
        id.to_string()
    }
}

fn free_stale_key(id: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut key = format!("{id}-stale");
    let mut n = 2;
    while taken(&key) {
        key = format!("{id}-stale-{n}");
        n += 1;
    }
    key
}

/// Move a stale thread off `id` so a live hunk can take the key.
pub(super) fn vacate_stale(revision: &mut RevisionComments, id: &str) {
    if !revision.hunks.get(id).is_some_and(|thread| thread.stale) {
        return;
    }
    let key = free_stale_key(id, |key| revision.hunks.contains_key(key));
    revision.hunks = std::mem::take(&mut revision.hunks)
        .into_iter()
        .map(|(k, thread)| if k == id { (key.clone(), thread) } else { (k, thread) })
        .collect();
}
