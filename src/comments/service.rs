//! Comment operations shared by the CLI and the TUI
//!
//! Every path that resolves a hunk id first relocates the revision's threads
//! when they were last verified against another commit.

use super::relocate::{relocate_revision, vacate_stale};
use super::{CommentAnchor, CommentEntry, CommentError, CommentStore, CommentsState, HunkComments, RevisionComments};
use crate::diff::{build_hunk_index, parse_diff, DiffFile, HunkIndexEntry};
use crate::gateway::{Gateway, RevisionInfo};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// A comment to attach to a hunk of the current diff
#[derive(Debug, Clone)]
pub struct NewComment {
    pub hunk_id: String,
    pub text: String,
    pub author: String,
    pub kind: String,
}

/// Stored threads of one revision, after relocation
#[derive(Debug, Clone)]
pub struct RevisionReport {
    pub change_id: String,
    pub commit_id: String,
    pub description: String,
    pub hunks: Vec<(String, HunkComments)>,
}

/// A hunk of the current diff and how many comments it carries
#[derive(Debug, Clone)]
pub struct HunkSummary {
    pub entry: HunkIndexEntry,
    pub comments: usize,
}

pub struct CommentService {
    gateway: Arc<dyn Gateway>,
    store: CommentStore,
}

impl CommentService {
    pub fn new(gateway: Arc<dyn Gateway>, store: CommentStore) -> Self {
        Self { gateway, store }
    }

    pub fn store(&self) -> &CommentStore {
        &self.store
    }

    /// The single revision `revset` names.
    pub fn resolve_single_revision(&self, revset: &str) -> Result<RevisionInfo, CommentError> {
        let mut revisions = self.gateway.fetch_revisions(revset)?;
        match revisions.len() {
            0 => Err(CommentError::NoRevision(revset.to_string())),
            1 => Ok(revisions.remove(0)),
            _ => Err(CommentError::AmbiguousRevset(revset.to_string())),
        }
    }

    fn diff_files(&self, revision: &RevisionInfo) -> Result<Vec<DiffFile>, CommentError> {
        let text = self.gateway.fetch_diff(&revision.commit_id)?;
        Ok(parse_diff(&text))
    }

    /// Threads of every revision in `revset` that has any.
    pub fn list(&mut self, revset: &str) -> Result<Vec<RevisionReport>, CommentError> {
        let revisions = self.gateway.fetch_revisions(revset)?;
        let mut state = self.store.state().clone();
        let mut mutated = false;
        let mut reports = Vec::new();

        for revision in revisions {
            if needs_relocation(&state, &revision) {
                let files = self.diff_files(&revision)?;
                mutated |= refresh(&mut state, &revision, &files);
            }
            let Some(stored) = state.revisions.get(&revision.change_id) else {
                continue;
            };
            if stored.hunks.is_empty() {
                continue;
            }
            reports.push(RevisionReport {
                hunks: stored
                    .hunks
                    .iter()
                    .map(|(id, thread)| (id.clone(), thread.clone()))
                    .collect(),
                change_id: revision.change_id,
                commit_id: revision.commit_id,
                description: revision.description,
            });
        }

        if mutated {
            self.store.save(state)?;
        }
        Ok(reports)
    }

    /// Add a comment to a hunk of the revision `revset` names. Returns the
    /// new comment id.
    pub fn add(&mut self, revset: &str, comment: NewComment) -> Result<String, CommentError> {
        if comment.text.trim().is_empty() {
            return Err(CommentError::EmptyText);
        }
        let revision = self.resolve_single_revision(revset)?;
        let files = self.diff_files(&revision)?;
        self.add_on(&revision, &files, comment)
    }

    /// Like `add`, against a diff the caller already parsed.
    pub fn add_on(
        &mut self,
        revision: &RevisionInfo,
        files: &[DiffFile],
        comment: NewComment,
    ) -> Result<String, CommentError> {
        if comment.text.trim().is_empty() {
            return Err(CommentError::EmptyText);
        }
        let index = build_hunk_index(files);
        let target = index
            .iter()
            .find(|entry| entry.id == comment.hunk_id)
            .ok_or_else(|| CommentError::HunkNotFound(comment.hunk_id.clone()))?;

        let mut state = self.store.state().clone();
        refresh(&mut state, revision, files);

        let mut stored = state
            .revisions
            .remove(&revision.change_id)
            .unwrap_or_else(|| RevisionComments::new(revision.commit_id.clone()));
        stored.commit_hash = revision.commit_id.clone();
        vacate_stale(&mut stored, &target.id);

        let anchor = CommentAnchor::from_entry(target);
        let thread = stored
            .hunks
            .entry(target.id.clone())
            .or_insert_with(|| HunkComments {
                anchor: anchor.clone(),
                comments: Vec::new(),
                stale: false,
            });
        thread.anchor = anchor;
        thread.stale = false;

        let entry = CommentEntry::new(comment.text, comment.author, comment.kind);
        let id = entry.id.clone();
        thread.comments.push(entry);

        state.revisions.insert(revision.change_id.clone(), stored);
        self.store.save(state)?;
        debug!(comment = %id, hunk = %target.id, change = %revision.change_id, "added comment");
        Ok(id)
    }

    /// Remove one comment wherever it is stored.
    pub fn delete_comment(&mut self, id: &str) -> Result<(), CommentError> {
        let mut state = self.store.state().clone();
        let mut found = false;

        for revision in state.revisions.values_mut() {
            for thread in revision.hunks.values_mut() {
                let before = thread.comments.len();
                thread.comments.retain(|comment| comment.id != id);
                found |= thread.comments.len() != before;
            }
            revision.hunks.retain(|_, thread| !thread.comments.is_empty());
        }
        if !found {
            return Err(CommentError::CommentNotFound(id.to_string()));
        }
        state.revisions.retain(|_, revision| !revision.hunks.is_empty());

        self.store.save(state)
    }

    /// Remove the whole thread on `hunk_id`. Returns how many comments it had.
    pub fn delete_hunk(&mut self, revset: &str, hunk_id: &str) -> Result<usize, CommentError> {
        let revision = self.resolve_single_revision(revset)?;
        let mut state = self.store.state().clone();
        if needs_relocation(&state, &revision) {
            let files = self.diff_files(&revision)?;
            refresh(&mut state, &revision, &files);
        }

        let stored = state
            .revisions
            .get_mut(&revision.change_id)
            .ok_or_else(|| CommentError::NoCommentsForHunk(hunk_id.to_string()))?;
        let thread = stored
            .hunks
            .shift_remove(hunk_id)
            .ok_or_else(|| CommentError::NoCommentsForHunk(hunk_id.to_string()))?;
        if stored.hunks.is_empty() {
            state.revisions.remove(&revision.change_id);
        }

        self.store.save(state)?;
        Ok(thread.comments.len())
    }

    /// The current hunks of a revision with their comment counts.
    pub fn hunks(&mut self, revset: &str) -> Result<(RevisionInfo, Vec<HunkSummary>), CommentError> {
        let revision = self.resolve_single_revision(revset)?;
        let files = self.diff_files(&revision)?;
        let threads = self.threads_for(&revision, &files)?;

        let summaries = build_hunk_index(&files)
            .into_iter()
            .map(|entry| {
                let comments = threads
                    .get(&entry.id)
                    .filter(|thread| !thread.stale)
                    .map_or(0, |thread| thread.comments.len());
                HunkSummary { entry, comments }
            })
            .collect();
        Ok((revision, summaries))
    }

    /// Threads of `revision` keyed by hunk ids of `files`, persisting any
    /// relocation.
    pub fn threads_for(
        &mut self,
        revision: &RevisionInfo,
        files: &[DiffFile],
    ) -> Result<IndexMap<String, HunkComments>, CommentError> {
        let mut state = self.store.state().clone();
        if refresh(&mut state, revision, files) {
            self.store.save(state.clone())?;
        }
        Ok(state
            .revisions
            .get(&revision.change_id)
            .map(|stored| stored.hunks.clone())
            .unwrap_or_default())
    }
}

fn needs_relocation(state: &CommentsState, revision: &RevisionInfo) -> bool {
    state
        .revisions
        .get(&revision.change_id)
        .is_some_and(|stored| stored.commit_hash != revision.commit_id)
}

/// Relocate the stored threads of `revision` if they were verified against
/// another commit. Returns whether the document changed.
fn refresh(state: &mut CommentsState, revision: &RevisionInfo, files: &[DiffFile]) -> bool {
    if !needs_relocation(state, revision) {
        return false;
    }
    let Some(stored) = state.revisions.get(&revision.change_id) else {
        return false;
    };
    let mut updated = relocate_revision(stored, files).updated;
    updated.commit_hash = revision.commit_id.clone();
    state.revisions.insert(revision.change_id.clone(), updated);
    true
}
