//! Atomic file replacement
//!
//! Contents are written to a temporary file next to the target, synced, and
//! renamed over it. Readers see either the old file or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A fully written temporary file waiting to replace its target.
///
/// Dropping it without calling `commit` removes the temporary file and
/// leaves the target untouched.
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Rename the temporary file over the target.
    pub fn commit(self) -> io::Result<()> {
        self.temp.persist(&self.target).map_err(|err| err.error)?;
        Ok(())
    }
}

/// Write `contents` next to `path` without touching `path` yet.
pub fn stage(path: &Path, contents: &[u8]) -> io::Result<StagedWrite> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut temp = tempfile::Builder::new()
        .prefix(&format!("{file_name}.tmp-"))
        .tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;

    Ok(StagedWrite {
        temp,
        target: path.to_path_buf(),
    })
}

/// Stage and commit in one step.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    stage(path, contents)?.commit()
}
