//! Batch debouncing with an injectable clock

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nothing appended since the last flush (or ever)
    Idle,
    /// Appends are waiting for the deadline
    Pending { deadline: Instant },
    /// The last pending batch was delivered
    Flushed,
}

/// Coalesces appends into at most one flush per interval.
///
/// The first append arms the deadline; later appends ride along without
/// moving it, so a steady stream still flushes every `interval`.
#[derive(Debug, Clone)]
pub struct BatchDebouncer {
    interval: Duration,
    state: BatchState,
}

impl BatchDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn note_append(&mut self, now: Instant) {
        if !matches!(self.state, BatchState::Pending { .. }) {
            self.state = BatchState::Pending {
                deadline: now + self.interval,
            };
        }
    }

    /// Returns true exactly once per armed deadline, when it has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            BatchState::Pending { deadline } if now >= deadline => {
                self.state = BatchState::Flushed;
                true
            }
            _ => false,
        }
    }

    /// Time left before a pending flush is due.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        match self.state {
            BatchState::Pending { deadline } => Some(deadline.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// Drop any pending flush.
    pub fn reset(&mut self) {
        self.state = BatchState::Idle;
    }
}
