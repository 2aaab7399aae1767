//! jjdeck - terminal dashboard for jj with hunk-anchored review comments
//!
//! Streams the revision log, models and virtualizes diffs, and keeps review
//! comments attached to hunks as revisions are rewritten.

pub mod atomic;
pub mod comments;
pub mod config;
pub mod diff;
pub mod error;
pub mod export;
pub mod gateway;
pub mod logging;
pub mod process;
pub mod revlog;
pub mod syntax;
pub mod tui;
