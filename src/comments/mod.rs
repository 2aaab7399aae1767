//! Review comments anchored to diff hunks
//!
//! Comments are stored per repository in a versioned JSON document. Threads
//! are keyed by the hunk id of the diff they were last verified against and
//! carry an anchor so they can be re-attached after the revision changes.

mod relocate;
mod service;
mod store;

pub use relocate::{match_score, relocate_revision, Relocation, MATCH_THRESHOLD};
pub use service::{CommentService, HunkSummary, NewComment, RevisionReport};
pub use store::{hash_repo_path, CommentStore};

use crate::diff::HunkIndexEntry;
use crate::error::JjError;
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Current on-disk format version
pub const COMMENTS_VERSION: u32 = 1;

pub const DEFAULT_AUTHOR: &str = "human";
pub const DEFAULT_KIND: &str = "feedback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRange {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
}

impl LineRange {
    pub fn start(&self) -> u32 {
        if self.new_count > 0 {
            self.new_start
        } else {
            self.old_start
        }
    }

    /// `start-end` on the new side, or the old side for pure deletions.
    pub fn display(&self) -> String {
        let (start, count) = if self.new_count > 0 {
            (self.new_start, self.new_count)
        } else {
            (self.old_start, self.old_count)
        };
        let end = start.saturating_add(count.max(1) - 1);
        format!("{start}-{end}")
    }
}

/// Durable identity of a hunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAnchor {
    pub file_path: String,
    pub line_range: LineRange,
    #[serde(default)]
    pub context_lines: Vec<String>,
}

impl CommentAnchor {
    pub fn from_entry(entry: &HunkIndexEntry) -> Self {
        Self {
            file_path: entry.file_path.clone(),
            line_range: LineRange {
                old_start: entry.old_start,
                old_count: entry.old_count,
                new_start: entry.new_start,
                new_count: entry.new_count,
            },
            context_lines: entry.context_lines.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    pub id: String,
    pub text: String,
    pub author: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl CommentEntry {
    pub fn new(text: impl Into<String>, author: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: new_comment_id(),
            text: text.into(),
            author: author.into(),
            kind: kind.into(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            reply_to: None,
        }
    }
}

/// `cmt_` followed by 8 random hex characters
pub fn new_comment_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("cmt_{}", &uuid[..8])
}

/// A comment thread on one hunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkComments {
    pub anchor: CommentAnchor,
    #[serde(default)]
    pub comments: Vec<CommentEntry>,
    /// The last relocation could not find this hunk
    #[serde(default)]
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionComments {
    /// Commit the hunk ids below were computed against
    pub commit_hash: String,
    #[serde(default)]
    pub hunks: IndexMap<String, HunkComments>,
}

impl RevisionComments {
    pub fn new(commit_hash: impl Into<String>) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            hunks: IndexMap::new(),
        }
    }

    pub fn comment_count(&self) -> usize {
        self.hunks.values().map(|h| h.comments.len()).sum()
    }
}

/// The whole per-repository document, keyed by change id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentsState {
    pub version: u32,
    #[serde(default)]
    pub revisions: BTreeMap<String, RevisionComments>,
}

impl Default for CommentsState {
    fn default() -> Self {
        Self {
            version: COMMENTS_VERSION,
            revisions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("No revisions found for revset: {0}")]
    NoRevision(String),

    #[error("Revset '{0}' resolves to multiple revisions")]
    AmbiguousRevset(String),

    #[error("Hunk not found: {0}")]
    HunkNotFound(String),

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("No comments for hunk {0}")]
    NoCommentsForHunk(String),

    #[error("comment text is empty")]
    EmptyText,

    #[error(transparent)]
    Jj(#[from] JjError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode comments: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CommentError {
    /// Errors caused by what the user asked for, as opposed to the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CommentError::NoRevision(_)
                | CommentError::AmbiguousRevset(_)
                | CommentError::HunkNotFound(_)
                | CommentError::CommentNotFound(_)
                | CommentError::NoCommentsForHunk(_)
                | CommentError::EmptyText
        )
    }
}
