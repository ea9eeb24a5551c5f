//! Mainline Dispatcher
//!
//! Runs work submitted from arbitrary threads on one designated owner thread
//! (a UI, engine or process-main thread):
//! - Blocking submission: enqueue and wait until the item has run
//! - Async submission: enqueue and return
//! - Drain loop: FIFO passes over a snapshot of the queue, driven by the owner
//! - Failure isolation: panics are caught per item and reported to an observer
//! - Elapsed-time tracking for per-thread frame deltas

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod dispatcher;
pub mod failure;
pub mod global;
pub mod item;
pub mod options;
pub mod sync;
pub mod timing;

pub use dispatcher::{Dispatcher, DispatcherStats, DrainReport};
pub use failure::{Failure, FailureObserver};
pub use item::{Action, ItemId, Submission};
pub use options::DispatcherOptions;
pub use timing::{delta_time, ElapsedTracker};

/// Errors returned to the caller of a dispatcher operation
///
/// These are rejected calls: nothing is queued when one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The process-wide dispatcher has not been constructed
    #[error("Dispatcher was not initialized")]
    NotInitialized,

    /// No action was supplied
    #[error("No action supplied")]
    NullAction,

    /// Blocking submission from the owner thread would wait on itself forever
    #[error("Blocking submission from the owner thread")]
    SelfSubmission,

    /// The drain loop can only be driven from the owner thread
    #[error("Drain loop driven from a thread that does not own the dispatcher")]
    NotOwnerThread,

    /// The drain loop was driven from inside one of its own actions
    #[error("Drain loop re-entered from inside a queued action")]
    ReentrantDrain,

    /// A drain pass failed outside of any action; reported as a loop failure
    #[error("Drain pass failed outside of any action")]
    LoopFault,

    /// The dispatcher was shut down
    #[error("Dispatcher has been shut down")]
    ShutDown,
}

/// Dispatcher operation result
pub type DispatchResult<T> = Result<T, DispatchError>;
