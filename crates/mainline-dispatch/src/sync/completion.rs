//! Per-item completion notification

use parking_lot::{Condvar, Mutex};

/// One-shot notification owned by a single blocking submission
///
/// Each blocking item carries its own `Completion`, so a release can only
/// wake the submitter of that item.
pub struct Completion {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl Completion {
    /// Create a pending completion
    pub fn new() -> Self {
        Self {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Mark the item complete and release its waiter
    pub fn signal(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.condvar.notify_all();
    }

    /// Block until the item completes
    pub fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.condvar.wait(&mut done);
        }
    }

    /// Block until the item completes, with a timeout
    ///
    /// Returns whether the item completed.
    #[cfg(test)]
    pub(crate) fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let mut done = self.done.lock();
        if !*done {
            self.condvar.wait_for(&mut done, timeout);
        }
        *done
    }

    /// Whether the item has completed
    #[cfg(test)]
    pub(crate) fn is_done(&self) -> bool {
        *self.done.lock()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
