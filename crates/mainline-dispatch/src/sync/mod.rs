//! Synchronization primitives shared by producers and the owner thread
//!
//! Both are condvar-backed flags: the wake signal wakes the drain loop, the
//! completion releases exactly one blocked submitter.

mod completion;
mod wake;

pub use completion::Completion;
pub use wake::WakeSignal;
