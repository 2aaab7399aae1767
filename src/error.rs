//! Error types for talking to the jj subprocess
//!
//! Module seams return these typed errors; the binary wraps them with `anyhow`.

use std::time::Duration;
use thiserror::Error;

/// Phrase jj prints when the working copy lags behind the operation log.
const STALE_WORKING_COPY: &str = "working copy is stale";

/// Failure of a jj invocation.
#[derive(Debug, Error)]
pub enum JjError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`jj {command}` exited with status {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`jj {command}` timed out after {after:?}")]
    TimedOut { command: String, after: Duration },

    #[error("the working copy is stale; run `jj workspace update-stale`")]
    StaleWorkingCopy { stderr: String },

    #[error("i/o error while talking to jj: {0}")]
    Io(#[from] std::io::Error),
}

impl JjError {
    /// Classify a non-zero exit, recognizing the stale working copy message.
    pub fn from_exit(command: &str, code: i32, stderr: String) -> Self {
        if mentions_stale_working_copy(&stderr) {
            JjError::StaleWorkingCopy { stderr }
        } else {
            JjError::Failed {
                command: command.to_string(),
                code,
                stderr: stderr.trim().to_string(),
            }
        }
    }

    pub fn is_stale_working_copy(&self) -> bool {
        matches!(self, JjError::StaleWorkingCopy { .. })
    }
}

/// Case-insensitive check for jj's stale working copy message.
pub fn mentions_stale_working_copy(text: &str) -> bool {
    text.to_ascii_lowercase().contains(STALE_WORKING_COPY)
}

/// Whether one output line is jj's stale working copy diagnostic, as opposed
/// to, say, a commit description that happens to use the phrase.
pub fn is_stale_working_copy_diagnostic(line: &str) -> bool {
    let line = line.trim_start().to_ascii_lowercase();
    line.strip_prefix("error:")
        .is_some_and(|rest| rest.trim_start().starts_with("the working copy is stale"))
}
