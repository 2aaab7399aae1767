//! Application state and input handling

use super::{AppEvent, ChannelCallbacks};
use crate::comments::{CommentService, HunkComments, NewComment, DEFAULT_KIND};
use crate::config::Config;
use crate::diff::{
    build_hunk_index, line_number_width, line_pairs, max_line_number, parse_diff, DiffFile, DiffRow,
    HunkIndexEntry, WordDiffSegment, WrapCache,
};
use crate::gateway::{Gateway, RevisionInfo};
use crate::revlog::{Commit, LogError, LogQuery, LogRequests, StreamHandle, StreamOptions};
use crate::syntax::SyntaxHighlighter;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use indexmap::IndexMap;
use ratatui::widgets::{Block, Borders};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use tui_textarea::TextArea;

/// Columns moved per horizontal scroll step
const HORIZONTAL_STEP: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Log,
    Diff,
}

pub enum Mode {
    Normal,
    Comment { hunk_id: String, input: TextArea<'static> },
}

/// Location of a line within a diff: file, hunk and line index
pub type LineKey = (usize, usize, usize);

/// The diff currently on screen and everything derived from it
pub struct LoadedDiff {
    pub revision: RevisionInfo,
    pub files: Vec<DiffFile>,
    pub index: Vec<HunkIndexEntry>,
    pub threads: IndexMap<String, HunkComments>,
    /// Word-level segments for the two sides of 1:1 line edits
    pub word_diffs: HashMap<LineKey, Vec<WordDiffSegment>>,
    pub generation: u64,
    pub number_width: usize,
}

impl LoadedDiff {
    fn new(revision: RevisionInfo, files: Vec<DiffFile>, threads: IndexMap<String, HunkComments>, generation: u64) -> Self {
        let mut word_diffs = HashMap::new();
        for (f, file) in files.iter().enumerate() {
            for (h, hunk) in file.hunks.iter().enumerate() {
                for pair in line_pairs(hunk) {
                    word_diffs.insert((f, h, pair.deletion), pair.diff.old);
                    word_diffs.insert((f, h, pair.addition), pair.diff.new);
                }
            }
        }
        Self {
            index: build_hunk_index(&files),
            number_width: line_number_width(max_line_number(&files)),
            revision,
            files,
            threads,
            word_diffs,
            generation,
        }
    }

    pub fn hunk_id(&self, file: usize, hunk: usize) -> Option<&str> {
        self.index
            .iter()
            .find(|entry| entry.file_index == file && entry.hunk_index == hunk)
            .map(|entry| entry.id.as_str())
    }

    /// Comments on a live hunk; stale threads are not shown against hunks.
    pub fn comment_count(&self, hunk_id: &str) -> usize {
        self.threads
            .get(hunk_id)
            .filter(|thread| !thread.stale)
            .map_or(0, |thread| thread.comments.len())
    }

    pub fn stale_threads(&self) -> usize {
        self.threads.values().filter(|thread| thread.stale).count()
    }
}

pub struct App {
    gateway: Arc<dyn Gateway>,
    service: CommentService,
    pub(super) config: Config,
    events: Sender<AppEvent>,

    // Log state
    log_requests: LogRequests,
    log_stream: Option<StreamHandle>,
    limit: usize,
    pub(super) commits: Vec<Commit>,
    pub(super) has_more: bool,
    pub(super) log_loading: bool,
    pub(super) selected: usize,
    pub(super) stale_working_copy: bool,

    // Diff state
    diff_generation: u64,
    pub(super) diff: Option<LoadedDiff>,
    pub(super) diff_loading: bool,
    pub(super) wrap_cache: WrapCache,
    pub(super) wrap: bool,
    pub(super) scroll_top: usize,
    pub(super) horizontal_scroll: usize,
    pub(super) focused_hunk: usize,
    /// Content width and height of the diff viewport at the last draw
    pub(super) viewport: (usize, usize),
    pub(super) highlighter: Option<SyntaxHighlighter>,

    // UI state
    pub(super) focus: Focus,
    pub(super) mode: Mode,
    pub(super) message: Option<String>,
    pub(super) show_help: bool,
}

impl App {
    pub fn new(gateway: Arc<dyn Gateway>, service: CommentService, config: Config, events: Sender<AppEvent>) -> Self {
        let highlighter = config
            .diff
            .syntax_highlighting
            .then(|| SyntaxHighlighter::new(config.diff.syntax_theme.as_deref()));
        Self {
            gateway,
            service,
            limit: config.log.limit.max(1),
            wrap: config.diff.wrap,
            config,
            events,
            log_requests: LogRequests::new(),
            log_stream: None,
            commits: Vec::new(),
            has_more: false,
            log_loading: false,
            selected: 0,
            stale_working_copy: false,
            diff_generation: 0,
            diff: None,
            diff_loading: false,
            wrap_cache: WrapCache::new(),
            scroll_top: 0,
            horizontal_scroll: 0,
            focused_hunk: 0,
            viewport: (80, 24),
            highlighter,
            focus: Focus::Log,
            mode: Mode::Normal,
            message: None,
            show_help: false,
        }
    }

    pub fn selected_commit(&self) -> Option<&Commit> {
        self.commits.get(self.selected)
    }

    /// Start a new log request, superseding any in flight.
    pub fn reload_log(&mut self) {
        if let Some(previous) = self.log_stream.take() {
            previous.cancel();
        }
        let reserved = self.log_requests.begin();
        let callbacks = ChannelCallbacks {
            generation: reserved.generation(),
            events: self.events.clone(),
        };
        let handle = self.log_requests.start_with(
            reserved,
            Arc::clone(&self.gateway),
            LogQuery::new(self.limit),
            StreamOptions {
                debounce: Duration::from_millis(self.config.log.debounce_ms),
                ..StreamOptions::default()
            },
            callbacks,
        );
        debug!(generation = handle.generation(), limit = self.limit, "log reload");
        self.log_stream = Some(handle);
        self.log_loading = true;
    }

    fn load_more(&mut self) {
        if !self.has_more || self.log_loading {
            return;
        }
        self.limit += self.config.log.limit.max(1);
        self.reload_log();
    }

    fn is_current_log(&self, generation: u64) -> bool {
        self.log_stream
            .as_ref()
            .is_some_and(|handle| handle.generation() == generation && handle.is_live())
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::LogBatch { generation, commits } => {
                if self.is_current_log(generation) {
                    self.apply_commits(commits);
                }
            }
            AppEvent::LogComplete { generation, page } => {
                if self.is_current_log(generation) {
                    self.log_loading = false;
                    self.has_more = page.has_more;
                    self.stale_working_copy = false;
                    self.apply_commits(page.commits);
                }
            }
            AppEvent::LogFailed { generation, error } => {
                if self.is_current_log(generation) {
                    self.log_loading = false;
                    self.report_log_error(&error);
                }
            }
            AppEvent::DiffLoaded {
                generation,
                revision,
                result,
            } => {
                if generation != self.diff_generation {
                    return;
                }
                self.diff_loading = false;
                match result {
                    Ok(files) => self.show_diff(revision, files, generation),
                    Err(err) => {
                        warn!(%err, "diff failed");
                        self.diff = None;
                        self.message = Some(format!("Diff failed: {err}"));
                    }
                }
            }
            AppEvent::StaleUpdated(result) => match result {
                Ok(()) => {
                    self.stale_working_copy = false;
                    self.message = Some("Working copy updated".to_string());
                    self.reload_log();
                }
                Err(err) => self.message = Some(format!("update-stale failed: {err}")),
            },
        }
    }

    fn report_log_error(&mut self, error: &LogError) {
        if error.is_stale_working_copy() {
            self.stale_working_copy = true;
            self.message = Some("Working copy is stale. Press U to run jj workspace update-stale".to_string());
        } else {
            self.message = Some(format!("Log failed: {error}"));
        }
    }

    fn apply_commits(&mut self, commits: Vec<Commit>) {
        let previous = self.selected_commit().map(|c| c.commit_id.clone());
        self.commits = commits;
        if self.commits.is_empty() {
            self.selected = 0;
            return;
        }
        self.selected = self.selected.min(self.commits.len() - 1);
        let current = self.selected_commit().map(|c| c.commit_id.clone());
        if current != previous {
            self.request_diff();
        }
    }

    /// Load the selected commit's diff in the background.
    fn request_diff(&mut self) {
        let Some(commit) = self.selected_commit() else {
            return;
        };
        let revision = RevisionInfo::from(commit);
        self.diff_generation += 1;
        self.diff_loading = true;

        let generation = self.diff_generation;
        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        thread::spawn(move || {
            let result = gateway.fetch_diff(&revision.commit_id).map(|text| parse_diff(&text));
            let _ = events.send(AppEvent::DiffLoaded {
                generation,
                revision,
                result,
            });
        });
    }

    fn show_diff(&mut self, revision: RevisionInfo, files: Vec<DiffFile>, generation: u64) {
        let threads = match self.service.threads_for(&revision, &files) {
            Ok(threads) => threads,
            Err(err) => {
                warn!(%err, "could not load comments");
                self.message = Some(format!("Comments unavailable: {err}"));
                IndexMap::new()
            }
        };
        let same_revision = self
            .diff
            .as_ref()
            .is_some_and(|diff| diff.revision.change_id == revision.change_id);
        if !same_revision {
            self.scroll_top = 0;
            self.horizontal_scroll = 0;
            self.focused_hunk = 0;
        }
        self.diff = Some(LoadedDiff::new(revision, files, threads, generation));
        self.wrap_cache.invalidate();
    }

    fn refresh_threads(&mut self) {
        let Some(diff) = self.diff.as_mut() else {
            return;
        };
        match self.service.threads_for(&diff.revision, &diff.files) {
            Ok(threads) => diff.threads = threads,
            Err(err) => self.message = Some(format!("Comments unavailable: {err}")),
        }
    }

    fn update_stale(&mut self) {
        self.message = Some("Running jj workspace update-stale...".to_string());
        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        thread::spawn(move || {
            let _ = events.send(AppEvent::StaleUpdated(gateway.update_stale()));
        });
    }

    /// Physical rows of the current diff at the last drawn width.
    fn rows_len(&mut self) -> usize {
        let Some(diff) = &self.diff else {
            return 0;
        };
        self.wrap_cache
            .rows(&diff.files, diff.generation, self.viewport.0, self.wrap, self.horizontal_scroll)
            .len()
    }

    /// Row index of a hunk's `@@` line.
    fn hunk_row(&mut self, hunk: usize) -> Option<usize> {
        let diff = self.diff.as_ref()?;
        let entry = diff.index.get(hunk)?;
        let (file, hunk) = (entry.file_index, entry.hunk_index);
        self.wrap_cache
            .rows(&diff.files, diff.generation, self.viewport.0, self.wrap, self.horizontal_scroll)
            .iter()
            .position(|row| row.row == DiffRow::Content { file, hunk, line: 0 })
    }

    fn scroll_by(&mut self, delta: isize) {
        let max = self.rows_len().saturating_sub(1);
        self.scroll_top = self.scroll_top.saturating_add_signed(delta).min(max);
    }

    fn focus_hunk(&mut self, hunk: usize) {
        let count = self.diff.as_ref().map_or(0, |d| d.index.len());
        if count == 0 {
            return;
        }
        self.focused_hunk = hunk.min(count - 1);
        if let Some(row) = self.hunk_row(self.focused_hunk) {
            self.scroll_top = row;
        }
    }

    pub fn focused_entry(&self) -> Option<&HunkIndexEntry> {
        self.diff.as_ref()?.index.get(self.focused_hunk)
    }

    fn select(&mut self, index: usize) {
        if self.commits.is_empty() {
            return;
        }
        let index = index.min(self.commits.len() - 1);
        if index != self.selected {
            self.selected = index;
            self.request_diff();
        }
        if self.selected + 1 == self.commits.len() {
            self.load_more();
        }
    }

    fn start_comment(&mut self) {
        let Some(hunk_id) = self.focused_entry().map(|entry| entry.id.clone()) else {
            self.message = Some("No hunk to comment on".to_string());
            return;
        };
        let mut input = TextArea::default();
        input.set_block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Comment on {hunk_id} (Enter: save, Esc: cancel) ")),
        );
        self.mode = Mode::Comment { hunk_id, input };
    }

    fn save_comment(&mut self, hunk_id: String, text: String) {
        let Some(diff) = &self.diff else {
            return;
        };
        let comment = NewComment {
            hunk_id,
            text,
            author: self.config.comments.author.clone(),
            kind: DEFAULT_KIND.to_string(),
        };
        match self.service.add_on(&diff.revision, &diff.files, comment) {
            Ok(id) => {
                self.message = Some(format!("Added comment {id}"));
                self.refresh_threads();
            }
            Err(err) => self.message = Some(format!("Error: {err}")),
        }
    }

    fn delete_focused_thread(&mut self) {
        let Some(diff) = &self.diff else {
            return;
        };
        let Some(entry) = diff.index.get(self.focused_hunk) else {
            return;
        };
        let hunk_id = entry.id.clone();
        let revset = diff.revision.commit_id.clone();
        match self.service.delete_hunk(&revset, &hunk_id) {
            Ok(count) => {
                self.message = Some(format!("Deleted {count} comments from {hunk_id}"));
                self.refresh_threads();
            }
            Err(err) => self.message = Some(format!("Error: {err}")),
        }
    }

    /// Returns true when the application should exit.
    pub fn handle_input(&mut self, key: KeyEvent) -> Result<bool> {
        if let Mode::Comment { .. } = self.mode {
            self.handle_comment_input(key);
            return Ok(false);
        }

        self.message = None;
        if self.show_help {
            self.show_help = false;
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(true),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Log => Focus::Diff,
                    Focus::Diff => Focus::Log,
                }
            }
            KeyCode::Char('R') => self.reload_log(),
            KeyCode::Char('U') if self.stale_working_copy => self.update_stale(),
            KeyCode::Char('w') => {
                self.wrap = !self.wrap;
                self.horizontal_scroll = 0;
                self.message = Some(format!("Wrap {}", if self.wrap { "on" } else { "off" }));
            }
            _ => match self.focus {
                Focus::Log => self.handle_log_input(key),
                Focus::Diff => self.handle_diff_input(key),
            },
        }
        Ok(false)
    }

    fn handle_log_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.select(self.selected + 1),
            KeyCode::Char('k') | KeyCode::Up => self.select(self.selected.saturating_sub(1)),
            KeyCode::Char('g') => self.select(0),
            KeyCode::Char('G') => self.select(self.commits.len().saturating_sub(1)),
            KeyCode::Char('L') => self.load_more(),
            KeyCode::Enter | KeyCode::Char('l') => self.focus = Focus::Diff,
            _ => {}
        }
    }

    fn handle_diff_input(&mut self, key: KeyEvent) {
        let page = self.viewport.1.max(2) as isize / 2;
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.scroll_by(1),
            KeyCode::Char('k') | KeyCode::Up => self.scroll_by(-1),
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => self.scroll_by(page),
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => self.scroll_by(-page),
            KeyCode::PageDown => self.scroll_by(page * 2),
            KeyCode::PageUp => self.scroll_by(-page * 2),
            KeyCode::Char('g') => self.scroll_top = 0,
            KeyCode::Char('G') => self.scroll_top = self.rows_len().saturating_sub(1),
            KeyCode::Char(']') | KeyCode::Char('n') => self.focus_hunk(self.focused_hunk + 1),
            KeyCode::Char('[') | KeyCode::Char('N') => self.focus_hunk(self.focused_hunk.saturating_sub(1)),
            KeyCode::Char('l') | KeyCode::Right if !self.wrap => {
                self.horizontal_scroll += HORIZONTAL_STEP;
            }
            KeyCode::Char('h') | KeyCode::Left if !self.wrap => {
                self.horizontal_scroll = self.horizontal_scroll.saturating_sub(HORIZONTAL_STEP);
            }
            KeyCode::Char('c') => self.start_comment(),
            KeyCode::Char('D') => self.delete_focused_thread(),
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left => self.focus = Focus::Log,
            _ => {}
        }
    }

    fn handle_comment_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Enter if !key.modifiers.contains(KeyModifiers::ALT) => {
                if let Mode::Comment { hunk_id, input } = std::mem::replace(&mut self.mode, Mode::Normal) {
                    let text = input.lines().join("\n");
                    if text.trim().is_empty() {
                        self.message = Some("Empty comment discarded".to_string());
                    } else {
                        self.save_comment(hunk_id, text);
                    }
                }
            }
            _ => {
                if let Mode::Comment { input, .. } = &mut self.mode {
                    input.input(key);
                }
            }
        }
    }
}
