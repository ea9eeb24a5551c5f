//! Dispatcher configuration

use std::time::Duration;

/// Default bounded wait of one drain loop iteration
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Default delay before the first supervised restart of the drain loop
pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_millis(50);

/// Default upper bound for the restart delay
pub const DEFAULT_MAX_RESTART_BACKOFF: Duration = Duration::from_secs(1);

/// Options controlling the drain loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// How long one loop iteration waits for the wake signal before polling
    /// the queue anyway
    pub poll_interval: Duration,

    /// Delay before restarting the loop after a loop-level failure
    pub restart_backoff: Duration,

    /// Cap for the doubling restart delay
    pub max_restart_backoff: Duration,

    /// Label attached to log records (defaults to the owner thread's name)
    pub name: Option<String>,
}

impl DispatcherOptions {
    /// Create options with the default values
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            restart_backoff: DEFAULT_RESTART_BACKOFF,
            max_restart_backoff: DEFAULT_MAX_RESTART_BACKOFF,
            name: None,
        }
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the initial restart backoff
    pub fn restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    /// Set the maximum restart backoff
    pub fn max_restart_backoff(mut self, backoff: Duration) -> Self {
        self.max_restart_backoff = backoff;
        self
    }

    /// Set the log label
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restart delay after `consecutive` loop failures in a row (1-based)
    pub(crate) fn backoff_for(&self, consecutive: u32) -> Duration {
        let shift = consecutive.saturating_sub(1).min(16);
        self.restart_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_restart_backoff)
    }
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::new()
    }
}
