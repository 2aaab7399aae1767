//! Repository gateway
//!
//! Everything the dashboard asks of jj goes through the `Gateway` trait.
//! `JjGateway` shells out to the binary; tests substitute scripted fakes.

use crate::error::JjError;
use crate::process::{ChunkSource, ExecuteOptions, ProcessRunner};
use crate::revlog::{Commit, LogQuery};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const NO_DESCRIPTION: &str = "(no description set)";

const REVISION_TEMPLATE: &str =
    r#"change_id ++ "\t" ++ commit_id ++ "\t" ++ description.first_line() ++ "\n""#;

/// Identity of a single revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub change_id: String,
    pub commit_id: String,
    pub description: String,
}

impl From<&Commit> for RevisionInfo {
    fn from(commit: &Commit) -> Self {
        Self {
            change_id: commit.change_id.clone(),
            commit_id: commit.commit_id.clone(),
            description: commit.description.clone(),
        }
    }
}

/// Operations the dashboard needs from the version-control tool
pub trait Gateway: Send + Sync {
    /// Start a templated log and stream its stdout.
    fn fetch_log(&self, query: &LogQuery) -> Result<Box<dyn ChunkSource>, JjError>;

    /// Git-format diff of a revision against its parents.
    fn fetch_diff(&self, revision: &str) -> Result<String, JjError>;

    fn fetch_revisions(&self, revset: &str) -> Result<Vec<RevisionInfo>, JjError>;

    fn repo_root(&self) -> Result<PathBuf, JjError>;

    /// `jj workspace update-stale`
    fn update_stale(&self) -> Result<(), JjError>;
}

/// Gateway backed by the jj binary
#[derive(Debug, Clone)]
pub struct JjGateway {
    runner: ProcessRunner,
    cwd: PathBuf,
    timeout: Option<Duration>,
}

impl JjGateway {
    pub fn new(runner: ProcessRunner, cwd: PathBuf, timeout: Option<Duration>) -> Self {
        Self { runner, cwd, timeout }
    }

    fn options(&self) -> ExecuteOptions {
        ExecuteOptions {
            cwd: Some(self.cwd.clone()),
            env: Vec::new(),
            timeout: self.timeout,
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, JjError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let output = self.runner.execute(&args, &self.options())?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(JjError::from_exit(&args[0], output.exit_code, output.stderr))
        }
    }
}

impl Gateway for JjGateway {
    fn fetch_log(&self, query: &LogQuery) -> Result<Box<dyn ChunkSource>, JjError> {
        // streams are cancelled by generation, never by a wall-clock timeout
        let options = ExecuteOptions {
            timeout: None,
            ..self.options()
        };
        let chunks = self.runner.stream(&query.args(), &options)?;
        Ok(Box::new(chunks))
    }

    fn fetch_diff(&self, revision: &str) -> Result<String, JjError> {
        debug!(revision, "fetching diff");
        self.run(&[
            "diff",
            "-r",
            revision,
            "--git",
            "--color",
            "never",
            "--ignore-working-copy",
        ])
    }

    fn fetch_revisions(&self, revset: &str) -> Result<Vec<RevisionInfo>, JjError> {
        let stdout = self.run(&[
            "log",
            "-r",
            revset,
            "--no-graph",
            "--color",
            "never",
            "--ignore-working-copy",
            "-T",
            REVISION_TEMPLATE,
        ])?;
        Ok(parse_revisions(&stdout))
    }

    fn repo_root(&self) -> Result<PathBuf, JjError> {
        let stdout = self.run(&["root", "--ignore-working-copy"])?;
        Ok(PathBuf::from(stdout.trim()))
    }

    fn update_stale(&self) -> Result<(), JjError> {
        self.run(&["workspace", "update-stale"]).map(|_| ())
    }
}

/// Parse tab-separated `change\tcommit\tdescription` lines.
pub fn parse_revisions(output: &str) -> Vec<RevisionInfo> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\t');
            let change_id = fields.next()?.trim();
            let commit_id = fields.next()?.trim();
            if change_id.is_empty() || commit_id.is_empty() {
                return None;
            }
            let description = fields.next().unwrap_or("").trim();
            Some(RevisionInfo {
                change_id: change_id.to_string(),
                commit_id: commit_id.to_string(),
                description: if description.is_empty() {
                    NO_DESCRIPTION.to_string()
                } else {
                    description.to_string()
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_revisions() {
        let output = "kxqpmnwz\t1a2b3c4d\tFix parser\nytnwkvzs\t5e6f7a8b\t\n\n";
        let revisions = parse_revisions(output);
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].change_id, "kxqpmnwz");
        assert_eq!(revisions[0].commit_id, "1a2b3c4d");
        assert_eq!(revisions[0].description, "Fix parser");
        assert_eq!(revisions[1].description, "(no description set)");
    }

    #[test]
    fn test_parse_revisions_skips_malformed() {
        assert!(parse_revisions("just-one-field\n").is_empty());
    }
}
