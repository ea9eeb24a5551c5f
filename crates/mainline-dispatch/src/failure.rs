//! Failure reporting
//!
//! Panics raised by queued actions, and failures escaping the drain loop
//! itself, never reach the submitter. They are handed to a [`FailureObserver`]
//! instead: the dispatcher's own observer if one is set, otherwise the
//! process-wide observer, otherwise a `tracing` error record.

use crate::item::ItemId;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A failure caught by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// A queued action panicked
    #[error("Action {item} failed: {message}")]
    Action {
        /// Item whose action panicked
        item: ItemId,
        /// Panic message
        message: String,
    },

    /// A failure escaped the drain loop's own bookkeeping
    #[error("Drain loop failed (restart {restarts}): {message}")]
    Loop {
        /// Failure message
        message: String,
        /// Number of restarts so far, including the one this failure causes
        restarts: u64,
    },
}

impl Failure {
    /// Item the failure belongs to, if it came from an action
    pub fn item(&self) -> Option<ItemId> {
        match self {
            Failure::Action { item, .. } => Some(*item),
            Failure::Loop { .. } => None,
        }
    }

    /// Failure message
    pub fn message(&self) -> &str {
        match self {
            Failure::Action { message, .. } | Failure::Loop { message, .. } => message,
        }
    }
}

/// Receives failures caught by the dispatcher
pub trait FailureObserver: Send + Sync {
    /// Called once per failure, on the owner thread
    fn on_failure(&self, failure: &Failure);
}

impl<F> FailureObserver for F
where
    F: Fn(&Failure) + Send + Sync,
{
    fn on_failure(&self, failure: &Failure) {
        self(failure)
    }
}

static GLOBAL_OBSERVER: Lazy<RwLock<Option<Arc<dyn FailureObserver>>>> =
    Lazy::new(|| RwLock::new(None));

/// Register the process-wide observer, replacing any previous one
pub fn set_global_observer(observer: Arc<dyn FailureObserver>) {
    *GLOBAL_OBSERVER.write() = Some(observer);
}

/// Remove the process-wide observer
pub fn clear_global_observer() {
    *GLOBAL_OBSERVER.write() = None;
}

/// Whether a process-wide observer is registered
pub fn has_global_observer() -> bool {
    GLOBAL_OBSERVER.read().is_some()
}

/// Deliver `failure` to `local`, falling back to the process-wide observer
pub(crate) fn report(failure: &Failure, local: Option<Arc<dyn FailureObserver>>) {
    let observer = local.or_else(|| GLOBAL_OBSERVER.read().clone());

    match observer {
        Some(observer) => {
            // An observer that panics must not take the drain loop down with it
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| observer.on_failure(failure)));
            if let Err(payload) = delivered {
                tracing::error!(
                    %failure,
                    observer_panic = %panic_message(payload.as_ref()),
                    "failure observer panicked"
                );
            }
        }
        None => tracing::error!(%failure, "unobserved dispatcher failure"),
    }
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
