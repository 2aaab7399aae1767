//! Per-repository comment document
//!
//! Stored by hash of the repository root (privacy: no absolute paths on disk
//! beyond the user's own state directory). Read lazily, cached, and replaced
//! atomically on every write. The cache is dropped when the file changes on
//! disk, so a long-running dashboard picks up comments added from the CLI.

use super::{CommentError, CommentsState, COMMENTS_VERSION};
use crate::atomic;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

const FILE_NAME: &str = "comments.json";

/// Hex SHA-256 of the repository root path
pub fn hash_repo_path(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

/// Modification time and length of the file the cache was read from
type FileStamp = Option<(SystemTime, u64)>;

fn file_stamp(path: &Path) -> FileStamp {
    let metadata = std::fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

pub struct CommentStore {
    path: PathBuf,
    cache: Option<CommentsState>,
    stamp: FileStamp,
}

impl CommentStore {
    /// Store for `repo_root` under `<state_root>/repos/<hash>/comments.json`.
    /// Nothing is read until the first access.
    pub fn open(state_root: &Path, repo_root: &Path) -> Self {
        let path = state_root
            .join("repos")
            .join(hash_repo_path(repo_root))
            .join(FILE_NAME);
        Self::at_path(path)
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            cache: None,
            stamp: None,
        }
    }

    /// `<state dir>/jjdeck`, falling back to `~/.local/state/jjdeck`
    pub fn default_state_root() -> PathBuf {
        dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("state")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jjdeck")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current document, loading it on first use and again whenever the
    /// file was replaced by another process.
    pub fn state(&mut self) -> &CommentsState {
        let stamp = file_stamp(&self.path);
        if self.cache.is_some() && stamp != self.stamp {
            debug!(path = %self.path.display(), "comments changed on disk, reloading");
            self.cache = None;
        }
        self.stamp = stamp;
        let path = &self.path;
        self.cache.get_or_insert_with(|| load(path))
    }

    /// Write `state` atomically and make it the cached document.
    pub fn save(&mut self, mut state: CommentsState) -> Result<(), CommentError> {
        state.version = COMMENTS_VERSION;
        let json = serde_json::to_string_pretty(&state)?;
        atomic::write_atomic(&self.path, json.as_bytes()).map_err(|source| CommentError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), revisions = state.revisions.len(), "saved comments");
        self.stamp = file_stamp(&self.path);
        self.cache = Some(state);
        Ok(())
    }
}

/// Read the document; anything missing or unreadable yields an empty one.
fn load(path: &Path) -> CommentsState {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return CommentsState::default(),
        Err(err) => {
            warn!(path = %path.display(), %err, "could not read comments, starting empty");
            return CommentsState::default();
        }
    };

    match serde_json::from_str::<CommentsState>(&contents) {
        Ok(state) if state.version == COMMENTS_VERSION => state,
        Ok(state) => {
            warn!(version = state.version, "unsupported comments version, starting empty");
            CommentsState::default()
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "corrupt comments file, starting empty");
            CommentsState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::RevisionComments;
    use tempfile::tempdir;

    #[test]
    fn test_hash_is_stable_hex() {
        let a = hash_repo_path(Path::new("/work/repo"));
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_repo_path(Path::new("/work/repo")));
        assert_ne!(a, hash_repo_path(Path::new("/work/other")));
    }

    #[test]
    fn test_missing_file_is_empty_default() {
        let dir = tempdir().unwrap();
        let mut store = CommentStore::open(dir.path(), Path::new("/repo"));
        assert_eq!(store.state(), &CommentsState::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let mut store = CommentStore::open(dir.path(), Path::new("/repo"));
        let mut state = store.state().clone();
        state
            .revisions
            .insert("kxqp".to_string(), RevisionComments::new("abc"));
        store.save(state.clone()).unwrap();

        let mut reopened = CommentStore::open(dir.path(), Path::new("/repo"));
        assert_eq!(reopened.state(), &state);
        assert!(reopened.path().ends_with(Path::new("comments.json")));
    }

    #[test]
    fn test_sees_writes_from_another_store() {
        let dir = tempdir().unwrap();
        let mut reader = CommentStore::open(dir.path(), Path::new("/repo"));
        assert!(reader.state().revisions.is_empty());

        let mut writer = CommentStore::open(dir.path(), Path::new("/repo"));
        let mut first = CommentsState::default();
        first.revisions.insert("aaaa".to_string(), RevisionComments::new("c1"));
        writer.save(first.clone()).unwrap();
        assert_eq!(reader.state(), &first);

        let mut second = first.clone();
        second.revisions.insert("bbbb".to_string(), RevisionComments::new("c2"));
        writer.save(second.clone()).unwrap();
        assert_eq!(reader.state(), &second);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comments.json");
        std::fs::write(&path, "{ not json").unwrap();
        let mut store = CommentStore::at_path(path);
        assert_eq!(store.state(), &CommentsState::default());
    }

    #[test]
    fn test_interrupted_write_keeps_old_document() {
        let dir = tempdir().unwrap();
        let mut store = CommentStore::open(dir.path(), Path::new("/repo"));
        let mut old = CommentsState::default();
        old.revisions.insert("aaaa".to_string(), RevisionComments::new("c1"));
        store.save(old.clone()).unwrap();

        let mut new = old.clone();
        new.revisions.insert("bbbb".to_string(), RevisionComments::new("c2"));
        let json = serde_json::to_string_pretty(&new).unwrap();
        let staged = atomic::stage(store.path(), json.as_bytes()).unwrap();
        drop(staged);

        let mut reopened = CommentStore::open(dir.path(), Path::new("/repo"));
        assert_eq!(reopened.state(), &old);
    }
}
