//! Work items queued on the dispatcher

use crate::sync::Completion;
use std::fmt;
use std::sync::Arc;

/// Type-erased zero-argument action
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of a submitted work item, unique per dispatcher
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(u64);

impl ItemId {
    /// Create an ID from a raw value
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a submitter waits for its item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Enqueue and wait until the item has run
    Blocking,
    /// Enqueue and return immediately
    Async,
}

/// Queue entry
pub(crate) struct WorkItem {
    pub(crate) id: ItemId,
    /// Taken by the drain loop right before execution
    pub(crate) action: Option<Action>,
    /// Present for blocking submissions only
    pub(crate) completion: Option<Arc<Completion>>,
}

impl WorkItem {
    pub(crate) fn new(id: ItemId, action: Action, completion: Option<Arc<Completion>>) -> Self {
        Self {
            id,
            action: Some(action),
            completion,
        }
    }

    /// Whether the action has already been handed to the drain loop
    pub(crate) fn is_taken(&self) -> bool {
        self.action.is_none()
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("taken", &self.is_taken())
            .field("blocking", &self.completion.is_some())
            .finish()
    }
}
