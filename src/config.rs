//! Configuration module for jjdeck
//!
//! Loads user configuration from `<config dir>/jjdeck/config.toml`.

use crate::atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub jj: JjConfig,
    pub log: LogConfig,
    pub diff: DiffConfig,
    pub comments: CommentsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JjConfig {
    /// Program to run, looked up on PATH
    pub binary: String,
    /// Timeout for one-shot commands; 0 disables it
    pub timeout_ms: u64,
}

impl Default for JjConfig {
    fn default() -> Self {
        Self {
            binary: "jj".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl JjConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Revisions per page
    pub limit: usize,
    /// Delay before streamed revisions are shown
    pub debounce_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            debounce_ms: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiffConfig {
    pub wrap: bool,
    pub syntax_highlighting: bool,
    /// Syntax theme name (syntect/bat theme)
    pub syntax_theme: Option<String>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            wrap: false,
            syntax_highlighting: true,
            syntax_theme: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommentsConfig {
    /// Author label for new comments
    pub author: String,
    /// Overrides the state directory comments are stored under
    pub state_dir: Option<PathBuf>,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            author: crate::comments::DEFAULT_AUTHOR.to_string(),
            state_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the default path; a missing file gives defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// `<config dir>/jjdeck/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jjdeck").join("config.toml"))
    }

    /// Root for comment documents and the log file.
    pub fn state_root(&self) -> PathBuf {
        self.comments
            .state_dir
            .clone()
            .unwrap_or_else(crate::comments::CommentStore::default_state_root)
    }

    /// Write a default config file to `path`, refusing to overwrite one.
    pub fn create_default(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        let contents = toml::to_string_pretty(&Config::default()).context("Failed to serialize config")?;
        atomic::write_atomic(path, contents.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
