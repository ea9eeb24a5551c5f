//! Process-wide dispatcher instance
//!
//! Hosts that want a single dispatcher reachable from anywhere construct it
//! once, from the owner thread, with [`construct`]. Later calls return the
//! existing instance untouched.

use crate::dispatcher::{Dispatcher, DrainReport};
use crate::item::ItemId;
use crate::options::DispatcherOptions;
use crate::{DispatchError, DispatchResult};
use once_cell::sync::OnceCell;
use std::time::Duration;

static INSTANCE: OnceCell<Dispatcher> = OnceCell::new();

/// Construct the process-wide dispatcher owned by the calling thread
///
/// If it already exists this does nothing: the owner, queue and wake signal
/// of the existing instance are kept and `options` is ignored.
pub fn construct(options: DispatcherOptions) -> &'static Dispatcher {
    let mut created = false;
    let dispatcher = INSTANCE.get_or_init(|| {
        created = true;
        Dispatcher::new(options)
    });

    if !created {
        tracing::debug!(dispatcher = %dispatcher.name(), "dispatcher already constructed");
    }
    dispatcher
}

/// The process-wide dispatcher, if constructed
pub fn get() -> Option<&'static Dispatcher> {
    INSTANCE.get()
}

/// Whether the process-wide dispatcher exists and accepts submissions
pub fn is_running() -> bool {
    INSTANCE.get().map_or(false, Dispatcher::is_running)
}

fn instance() -> DispatchResult<&'static Dispatcher> {
    INSTANCE.get().ok_or(DispatchError::NotInitialized)
}

/// Run `action` on the owner thread and wait for it
pub fn submit_blocking<F>(action: F) -> DispatchResult<ItemId>
where
    F: FnOnce() + Send + 'static,
{
    instance()?.submit_blocking(action)
}

/// Queue `action` for the owner thread
pub fn submit_async<F>(action: F) -> DispatchResult<ItemId>
where
    F: FnOnce() + Send + 'static,
{
    instance()?.submit_async(action)
}

/// Wait up to `timeout` and run one drain pass on the owner thread
pub fn pump(timeout: Duration) -> DispatchResult<DrainReport> {
    instance()?.pump(timeout)
}

/// Drive the process-wide drain loop until shutdown
pub fn run() -> DispatchResult<()> {
    instance()?.run()
}

/// Shut the process-wide dispatcher down, if it exists
pub fn shutdown() {
    if let Some(dispatcher) = INSTANCE.get() {
        dispatcher.shutdown();
    }
}
