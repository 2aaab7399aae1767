//! Log stream sessions, generations and cancellation

use super::{BatchDebouncer, Clock, Commit, LogError, LogLineParser, LogQuery, SystemClock};
use crate::error::{mentions_stale_working_copy, JjError};
use crate::gateway::Gateway;
use crate::process::{ChunkSource, StreamExit};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound on how long the session thread sleeps between liveness checks.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Receives the results of one log request
pub trait LogCallbacks: Send {
    /// Commits parsed so far, in output order, at most `limit` of them.
    fn on_batch(&mut self, commits: &[Commit]);
    fn on_complete(&mut self, page: LogPage);
    fn on_error(&mut self, error: LogError);
}

/// Final result of a log request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogPage {
    pub commits: Vec<Commit>,
    pub has_more: bool,
}

/// Handle to an in-flight request.
///
/// A handle stops delivering once cancelled or once a newer request has been
/// started from the same `LogRequests`.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    generation: u64,
    cancelled: Arc<AtomicBool>,
    latest: Arc<AtomicU64>,
}

impl StreamHandle {
    fn new(generation: u64, latest: Arc<AtomicU64>) -> Self {
        Self {
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
            latest,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop delivery. Calling it again has no further effect.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::SeqCst) != self.generation
    }

    /// Callbacks may still fire for this request.
    pub fn is_live(&self) -> bool {
        !self.is_cancelled() && !self.is_superseded()
    }
}

/// Tuning for a streamed request
#[derive(Clone)]
pub struct StreamOptions {
    pub debounce: Duration,
    pub clock: Arc<dyn Clock>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(25),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Issues log requests with monotonically increasing generations
#[derive(Debug, Clone, Default)]
pub struct LogRequests {
    latest: Arc<AtomicU64>,
}

impl LogRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next generation, superseding every earlier handle.
    pub fn begin(&self) -> StreamHandle {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        StreamHandle::new(generation, Arc::clone(&self.latest))
    }

    pub fn current_generation(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Start a streamed request on a background thread.
    pub fn start<C>(
        &self,
        gateway: Arc<dyn Gateway>,
        query: LogQuery,
        options: StreamOptions,
        callbacks: C,
    ) -> StreamHandle
    where
        C: LogCallbacks + 'static,
    {
        self.start_with(self.begin(), gateway, query, options, callbacks)
    }

    /// Like `start`, for a handle already reserved with `begin`, so callbacks
    /// can be built knowing their generation.
    pub fn start_with<C>(
        &self,
        handle: StreamHandle,
        gateway: Arc<dyn Gateway>,
        query: LogQuery,
        options: StreamOptions,
        callbacks: C,
    ) -> StreamHandle
    where
        C: LogCallbacks + 'static,
    {
        let session = LogSession::new(handle.clone(), query.limit, options.debounce, callbacks);
        debug!(generation = handle.generation(), limit = query.limit, "starting log stream");
        thread::spawn(move || run_session(gateway, query, options.clock, session));
        handle
    }

    /// Fetch one page on the calling thread.
    ///
    /// The request gets its own generation counter, so it neither supersedes
    /// nor is superseded by streamed requests.
    pub fn fetch_page(gateway: &dyn Gateway, query: &LogQuery) -> Result<LogPage, LogError> {
        let handle = StreamHandle::new(1, Arc::new(AtomicU64::new(1)));
        let (tx, rx) = mpsc::channel();
        let mut session = LogSession::new(handle, query.limit, Duration::ZERO, PageCollector(tx));

        let exit = match gateway.fetch_log(query) {
            Ok(mut source) => loop {
                match source.next_chunk() {
                    Ok(Some(chunk)) => session.on_chunk(&chunk, Instant::now()),
                    Ok(None) => break source.finish(),
                    Err(err) => break Err(err),
                }
            },
            Err(err) => Err(err),
        };
        session.finish(exit);

        rx.recv()
            .unwrap_or_else(|_| Err(LogError::Jj(io::Error::other("log session ended without a result").into())))
    }
}

struct PageCollector(Sender<Result<LogPage, LogError>>);

impl LogCallbacks for PageCollector {
    fn on_batch(&mut self, _commits: &[Commit]) {}

    fn on_complete(&mut self, page: LogPage) {
        let _ = self.0.send(Ok(page));
    }

    fn on_error(&mut self, error: LogError) {
        let _ = self.0.send(Err(error));
    }
}

/// State of one request: parser, debouncer and accumulated commits.
///
/// Every entry point checks the handle first, so a cancelled or superseded
/// request never reaches its callbacks, not even through a flush that was
/// already pending.
pub struct LogSession<C> {
    handle: StreamHandle,
    limit: usize,
    parser: LogLineParser,
    debouncer: BatchDebouncer,
    commits: Vec<Commit>,
    callbacks: C,
}

impl<C: LogCallbacks> LogSession<C> {
    pub fn new(handle: StreamHandle, limit: usize, debounce: Duration, callbacks: C) -> Self {
        Self {
            handle,
            limit,
            parser: LogLineParser::new(),
            debouncer: BatchDebouncer::new(debounce),
            commits: Vec::new(),
            callbacks,
        }
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    pub fn on_chunk(&mut self, chunk: &str, now: Instant) {
        if !self.is_live() {
            return;
        }
        self.parser.push(chunk);
        let completed = self.parser.take_completed();
        if !completed.is_empty() {
            self.commits.extend(completed);
            self.debouncer.note_append(now);
        }
        self.tick(now);
    }

    /// Deliver a batch if the debounce deadline has passed.
    pub fn tick(&mut self, now: Instant) {
        if !self.is_live() {
            self.debouncer.reset();
            return;
        }
        if self.debouncer.poll(now) {
            let visible = self.commits.len().min(self.limit);
            self.callbacks.on_batch(&self.commits[..visible]);
        }
    }

    /// How long until the session wants another `tick`.
    pub fn next_wake(&self, now: Instant) -> Option<Duration> {
        self.debouncer.time_until_due(now)
    }

    /// The process ended (or could not be read); report the outcome.
    pub fn finish(mut self, exit: Result<StreamExit, JjError>) {
        self.debouncer.reset();
        if !self.is_live() {
            debug!(generation = self.handle.generation(), "dropping result of stale log stream");
            return;
        }

        self.parser.finish();
        self.commits.extend(self.parser.take_completed());

        let exit = match exit {
            Ok(exit) => exit,
            Err(err) => {
                self.callbacks.on_error(LogError::Jj(err));
                return;
            }
        };

        let stale = self.parser.saw_stale_working_copy() || mentions_stale_working_copy(&exit.stderr);
        if exit.exit_code != 0 && stale {
            warn!("jj reports a stale working copy");
            self.callbacks.on_error(LogError::StaleWorkingCopy { stderr: exit.stderr });
        } else if exit.exit_code != 0 {
            self.callbacks.on_error(LogError::Command {
                code: exit.exit_code,
                stderr: exit.stderr.trim().to_string(),
            });
        } else {
            let has_more = self.commits.len() > self.limit;
            self.commits.truncate(self.limit);
            debug!(
                generation = self.handle.generation(),
                commits = self.commits.len(),
                has_more,
                "log stream complete"
            );
            self.callbacks.on_complete(LogPage {
                commits: self.commits,
                has_more,
            });
        }
    }

    /// The stream could not even be started.
    pub fn fail(self, err: JjError) {
        self.finish(Err(err));
    }
}

enum StreamEvent {
    Chunk(String),
    End(Result<StreamExit, JjError>),
}

fn run_session<C: LogCallbacks>(
    gateway: Arc<dyn Gateway>,
    query: LogQuery,
    clock: Arc<dyn Clock>,
    mut session: LogSession<C>,
) {
    let source = match gateway.fetch_log(&query) {
        Ok(source) => source,
        Err(err) => return session.fail(err),
    };

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || pump(source, tx));

    loop {
        if !session.is_live() {
            return;
        }
        let wait = session
            .next_wake(clock.now())
            .map_or(IDLE_WAIT, |due| due.min(IDLE_WAIT));
        match rx.recv_timeout(wait) {
            Ok(StreamEvent::Chunk(chunk)) => session.on_chunk(&chunk, clock.now()),
            Ok(StreamEvent::End(exit)) => return session.finish(exit),
            Err(RecvTimeoutError::Timeout) => session.tick(clock.now()),
            Err(RecvTimeoutError::Disconnected) => {
                let err = io::Error::new(io::ErrorKind::BrokenPipe, "log reader stopped");
                return session.finish(Err(err.into()));
            }
        }
    }
}

/// Read the subprocess to the end. Once nobody listens, keep draining so the
/// child is never blocked on a full pipe, then reap it.
fn pump(mut source: Box<dyn ChunkSource>, tx: Sender<StreamEvent>) {
    let mut listening = true;
    loop {
        match source.next_chunk() {
            Ok(Some(chunk)) => {
                if listening && tx.send(StreamEvent::Chunk(chunk)).is_err() {
                    listening = false;
                }
            }
            Ok(None) => break,
            Err(err) => {
                let _ = source.finish();
                let _ = tx.send(StreamEvent::End(Err(err)));
                return;
            }
        }
    }
    let _ = tx.send(StreamEvent::End(source.finish()));
}
