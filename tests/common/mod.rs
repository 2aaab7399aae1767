//! Shared fixtures: an in-memory stand-in for jj

#![allow(dead_code)]

use jjdeck::comments::{CommentService, CommentStore};
use jjdeck::error::JjError;
use jjdeck::gateway::{Gateway, RevisionInfo};
use jjdeck::process::{ChunkSource, StreamExit};
use jjdeck::revlog::{LogQuery, MARKER};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Repo {
    /// Revset -> revisions it resolves to
    revsets: HashMap<String, Vec<RevisionInfo>>,
    /// Commit id -> git diff text
    diffs: HashMap<String, String>,
    log_chunks: Vec<String>,
    log_exit_code: i32,
    log_stderr: String,
    diff_requests: Vec<String>,
}

/// A repository whose revisions and diffs are set by the test
#[derive(Default)]
pub struct FakeGateway {
    repo: Mutex<Repo>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `@`, the change id and the commit id all resolve to this revision
    /// with the given diff. Calling it again with the same change id models a
    /// rewrite.
    pub fn set_revision(&self, change_id: &str, commit_id: &str, description: &str, diff: &str) {
        let revision = RevisionInfo {
            change_id: change_id.to_string(),
            commit_id: commit_id.to_string(),
            description: description.to_string(),
        };
        let mut repo = self.repo.lock().unwrap();
        for revset in ["@", change_id, commit_id] {
            repo.revsets.insert(revset.to_string(), vec![revision.clone()]);
        }
        repo.diffs.insert(commit_id.to_string(), diff.to_string());
    }

    pub fn set_revset(&self, revset: &str, revisions: Vec<RevisionInfo>) {
        self.repo.lock().unwrap().revsets.insert(revset.to_string(), revisions);
    }

    pub fn set_log(&self, chunks: Vec<String>, exit_code: i32, stderr: &str) {
        let mut repo = self.repo.lock().unwrap();
        repo.log_chunks = chunks;
        repo.log_exit_code = exit_code;
        repo.log_stderr = stderr.to_string();
    }

    pub fn diff_requests(&self) -> Vec<String> {
        self.repo.lock().unwrap().diff_requests.clone()
    }
}

struct FakeChunks {
    chunks: std::vec::IntoIter<String>,
    exit: StreamExit,
}

impl ChunkSource for FakeChunks {
    fn next_chunk(&mut self) -> Result<Option<String>, JjError> {
        Ok(self.chunks.next())
    }

    fn finish(self: Box<Self>) -> Result<StreamExit, JjError> {
        Ok(self.exit)
    }
}

impl Gateway for FakeGateway {
    fn fetch_log(&self, _query: &LogQuery) -> Result<Box<dyn ChunkSource>, JjError> {
        let repo = self.repo.lock().unwrap();
        Ok(Box::new(FakeChunks {
            chunks: repo.log_chunks.clone().into_iter(),
            exit: StreamExit {
                stderr: repo.log_stderr.clone(),
                exit_code: repo.log_exit_code,
            },
        }))
    }

    fn fetch_diff(&self, revision: &str) -> Result<String, JjError> {
        let mut repo = self.repo.lock().unwrap();
        repo.diff_requests.push(revision.to_string());
        repo.diffs.get(revision).cloned().ok_or_else(|| JjError::Failed {
            command: "diff".to_string(),
            code: 1,
            stderr: format!("Error: Revision `{revision}` doesn't exist"),
        })
    }

    fn fetch_revisions(&self, revset: &str) -> Result<Vec<RevisionInfo>, JjError> {
        Ok(self
            .repo
            .lock()
            .unwrap()
            .revsets
            .get(revset)
            .cloned()
            .unwrap_or_default())
    }

    fn repo_root(&self) -> Result<PathBuf, JjError> {
        Ok(PathBuf::from("/work/repo"))
    }

    fn update_stale(&self) -> Result<(), JjError> {
        Ok(())
    }
}

pub fn service(gateway: &Arc<FakeGateway>, state_root: &Path) -> CommentService {
    let gateway: Arc<dyn Gateway> = gateway.clone();
    let store = CommentStore::open(state_root, Path::new("/work/repo"));
    CommentService::new(gateway, store)
}

/// A log header line as the log template renders it.
pub fn header_line(gutter: &str, change: &str, description: &str) -> String {
    let commit_id = format!("{change}-commit");
    let reference = format!("{change} ada 2024-05-01 {commit_id}");
    let fields = [
        change,
        commit_id.as_str(),
        "false",
        "false",
        "false",
        description,
        "Ada",
        "ada@example.com",
        "2024-05-01 10:00:00",
        "",
        "false",
        "",
        reference.as_str(),
    ];
    let mut line = gutter.to_string();
    for field in fields {
        line.push_str(MARKER);
        line.push_str(field);
    }
    line
}

/// A diff of `path` with one single-line edit per `(start, context)` hunk.
pub fn diff_text(path: &str, hunks: &[(u32, &[&str])]) -> String {
    let mut text = format!("diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n");
    for (start, context) in hunks {
        let count = context.len() as u32 + 1;
        text.push_str(&format!("@@ -{start},{count} +{start},{count} @@\n"));
        for line in *context {
            text.push_str(&format!(" {line}\n"));
        }
        text.push_str("-old\n+new\n");
    }
    text
}
