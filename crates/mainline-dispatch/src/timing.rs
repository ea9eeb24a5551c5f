//! Elapsed time between successive calls
//!
//! Independent of the dispatcher. Useful for frame deltas on the owner
//! thread or for per-thread rate measurements on producers.

use std::cell::Cell;
use std::time::{Duration, Instant};

thread_local! {
    static LAST_CALL: Cell<Option<Instant>> = Cell::new(None);
}

/// Seconds since the calling thread's previous call
///
/// The first call on a thread returns `0.0` and starts its clock. Each thread
/// keeps its own clock, dropped when the thread exits.
pub fn delta_time() -> f32 {
    let now = Instant::now();
    LAST_CALL.with(|last| match last.replace(Some(now)) {
        Some(previous) => now.duration_since(previous).as_secs_f32(),
        None => 0.0,
    })
}

/// Explicit elapsed-time tracker for callers that want their own clock
#[derive(Debug, Clone, Default)]
pub struct ElapsedTracker {
    last: Option<Instant>,
}

impl ElapsedTracker {
    /// Create a tracker that has not ticked yet
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Time since the previous tick; zero on the first tick
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        match self.last.replace(now) {
            Some(previous) => now.duration_since(previous),
            None => Duration::ZERO,
        }
    }

    /// Time since the previous tick without advancing the clock
    pub fn peek(&self) -> Option<Duration> {
        self.last.map(|last| last.elapsed())
    }

    /// Forget the previous tick
    pub fn reset(&mut self) {
        self.last = None;
    }
}
