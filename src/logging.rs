//! Tracing setup
//!
//! Events go to `<state root>/jjdeck.log` so the terminal UI is never
//! written over. The filter comes from `JJDECK_LOG` and defaults to `warn`.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "JJDECK_LOG";
const LOG_FILE: &str = "jjdeck.log";
const DEFAULT_FILTER: &str = "warn";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Returns the log file path.
pub fn init(state_root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(state_root)
        .with_context(|| format!("Failed to create state directory: {}", state_root.display()))?;
    let path = state_root.join(LOG_FILE);
    let file = File::options()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(filter())
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(path)
}
