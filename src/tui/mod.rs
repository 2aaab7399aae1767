//! TUI layer using ratatui and crossterm
//!
//! Log and diff requests run on background threads and report back as
//! `AppEvent`s tagged with the generation that issued them. The event loop
//! applies only events of the current generation.

mod app;
mod ui;

pub use app::App;

use crate::comments::CommentService;
use crate::config::Config;
use crate::diff::DiffFile;
use crate::error::JjError;
use crate::gateway::{Gateway, RevisionInfo};
use crate::revlog::{Commit, LogCallbacks, LogError, LogPage};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Input poll interval; also bounds how long background results wait.
const TICK: Duration = Duration::from_millis(50);

/// Results delivered from background work
#[derive(Debug)]
pub enum AppEvent {
    LogBatch { generation: u64, commits: Vec<Commit> },
    LogComplete { generation: u64, page: LogPage },
    LogFailed { generation: u64, error: LogError },
    DiffLoaded {
        generation: u64,
        revision: RevisionInfo,
        result: Result<Vec<DiffFile>, JjError>,
    },
    StaleUpdated(Result<(), JjError>),
}

/// Forwards one log request's callbacks onto the event channel.
struct ChannelCallbacks {
    generation: u64,
    events: Sender<AppEvent>,
}

impl LogCallbacks for ChannelCallbacks {
    fn on_batch(&mut self, commits: &[Commit]) {
        let _ = self.events.send(AppEvent::LogBatch {
            generation: self.generation,
            commits: commits.to_vec(),
        });
    }

    fn on_complete(&mut self, page: LogPage) {
        let _ = self.events.send(AppEvent::LogComplete {
            generation: self.generation,
            page,
        });
    }

    fn on_error(&mut self, error: LogError) {
        let _ = self.events.send(AppEvent::LogFailed {
            generation: self.generation,
            error,
        });
    }
}

/// Runs the TUI application
pub fn run(gateway: Arc<dyn Gateway>, service: CommentService, config: Config) -> Result<()> {
    let (events, inbox) = mpsc::channel();
    let mut app = App::new(gateway, service, config, events);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.reload_log();
    let result = run_app(&mut terminal, &mut app, &inbox);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    inbox: &Receiver<AppEvent>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_input(key)? {
                    return Ok(());
                }
            }
        }

        while let Ok(event) = inbox.try_recv() {
            app.handle_event(event);
        }
    }
}
