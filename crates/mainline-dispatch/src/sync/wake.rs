//! Auto-resetting wake signal for the drain loop

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Binary, auto-resetting notification
///
/// Setting an already-set signal is a no-op, so wakeups never accumulate.
/// A wait consumes the signal.
pub struct WakeSignal {
    set: Mutex<bool>,
    notify: Condvar,
}

impl WakeSignal {
    /// Create a signal in the clear state
    pub fn new() -> Self {
        Self {
            set: Mutex::new(false),
            notify: Condvar::new(),
        }
    }

    /// Set the signal and wake the waiter, if any
    pub fn set(&self) {
        let mut set = self.set.lock();
        *set = true;
        self.notify.notify_one();
    }

    /// Wait until the signal is set or `timeout` elapses, then clear it
    ///
    /// Returns `true` if the signal was set, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut set = self.set.lock();
        if !*set {
            // Spurious wakeups are harmless: the caller polls the queue anyway
            self.notify.wait_for(&mut set, timeout);
        }
        std::mem::replace(&mut *set, false)
    }

    /// Whether the signal is currently set
    #[cfg(test)]
    pub(crate) fn is_set(&self) -> bool {
        *self.set.lock()
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}
