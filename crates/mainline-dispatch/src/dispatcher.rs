//! Owner-thread dispatcher
//!
//! Producers on any thread append work items to a shared FIFO queue and set
//! the wake signal. The owner thread (the thread that constructed the
//! dispatcher) runs the drain loop: it waits on the signal with a bounded
//! timeout, executes the items present when the pass began, then removes
//! them and releases their blocking submitters.
//!
//! The queue lock is never held while an action runs, so actions may submit
//! further async work; that work lands after the pass snapshot and runs in
//! the next pass.

use crate::failure::{self, panic_message, Failure, FailureObserver};
use crate::item::{Action, ItemId, Submission, WorkItem};
use crate::options::DispatcherOptions;
use crate::sync::{Completion, WakeSignal};
use crate::{DispatchError, DispatchResult};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions executed in this pass
    pub executed: usize,
    /// Executed actions that panicked
    pub failed: usize,
    /// Blocking submitters released
    pub released: usize,
    /// Items left queued for the next pass
    pub deferred: usize,
}

/// Cumulative dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Items accepted into the queue
    pub submitted: u64,
    /// Actions executed
    pub executed: u64,
    /// Actions that panicked
    pub failed: u64,
    /// Completed drain passes
    pub passes: u64,
    /// Supervised drain loop restarts
    pub restarts: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    passes: AtomicU64,
    restarts: AtomicU64,
}

/// State shared by every handle to one dispatcher
struct Shared {
    owner: ThreadId,
    label: String,
    options: DispatcherOptions,

    /// Pending items, front = oldest
    pending: Mutex<VecDeque<WorkItem>>,

    /// Wakes the drain loop
    wake: WakeSignal,

    /// Cleared by `shutdown`; only changed while `pending` is locked
    running: AtomicBool,

    /// Set while a drain pass or `run` is active on the owner thread
    draining: AtomicBool,

    next_id: AtomicU64,
    observer: RwLock<Option<Arc<dyn FailureObserver>>>,
    counters: Counters,

    /// Makes the next pass fail between execution and removal
    #[cfg(test)]
    inject_loop_fault: AtomicBool,
}

/// Main-thread affinity dispatcher
///
/// Cloning yields another handle to the same dispatcher. Hand clones to
/// producer threads; keep driving the loop on the owner thread with
/// [`pump`](Self::pump) (cooperative hosts) or [`run`](Self::run) (dedicated
/// owner thread).
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Create a dispatcher owned by the calling thread
    pub fn new(options: DispatcherOptions) -> Self {
        let current = thread::current();
        let label = options
            .name
            .clone()
            .or_else(|| current.name().map(str::to_string))
            .unwrap_or_else(|| "owner".to_string());

        tracing::debug!(
            dispatcher = %label,
            poll_ms = options.poll_interval.as_millis() as u64,
            "dispatcher constructed"
        );

        Self {
            shared: Arc::new(Shared {
                owner: current.id(),
                label,
                options,
                pending: Mutex::new(VecDeque::new()),
                wake: WakeSignal::new(),
                running: AtomicBool::new(true),
                draining: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                observer: RwLock::new(None),
                counters: Counters::default(),
                #[cfg(test)]
                inject_loop_fault: AtomicBool::new(false),
            }),
        }
    }

    /// Whether the dispatcher accepts submissions
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Thread that owns the drain loop
    pub fn owner(&self) -> ThreadId {
        self.shared.owner
    }

    /// Whether the calling thread is the owner thread
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.shared.owner
    }

    /// Log label of this dispatcher
    pub fn name(&self) -> &str {
        &self.shared.label
    }

    /// Options the dispatcher was created with
    pub fn options(&self) -> &DispatcherOptions {
        &self.shared.options
    }

    /// Number of queued items, including the ones of a pass in progress
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Snapshot of the cumulative counters
    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.counters;
        DispatcherStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            executed: counters.executed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            passes: counters.passes.load(Ordering::Relaxed),
            restarts: counters.restarts.load(Ordering::Relaxed),
        }
    }

    /// Route this dispatcher's failures to `observer` instead of the
    /// process-wide one
    pub fn set_failure_observer(&self, observer: Arc<dyn FailureObserver>) {
        *self.shared.observer.write() = Some(observer);
    }

    /// Fall back to the process-wide observer again
    pub fn clear_failure_observer(&self) {
        *self.shared.observer.write() = None;
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Run `action` on the owner thread and wait until it has finished
    ///
    /// Returns once the action has run (or panicked; the panic goes to the
    /// failure observer) and has been removed from the queue.
    pub fn submit_blocking<F>(&self, action: F) -> DispatchResult<ItemId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Some(Box::new(action)), Submission::Blocking)
    }

    /// Queue `action` for the owner thread and return immediately
    pub fn submit_async<F>(&self, action: F) -> DispatchResult<ItemId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Some(Box::new(action)), Submission::Async)
    }

    /// Type-erased submission entry point
    ///
    /// Blocking submission from the owner thread is rejected with
    /// [`DispatchError::SelfSubmission`]: the loop that would release it
    /// cannot run while the owner is waiting. Async submission from the owner
    /// thread is allowed and lands in the next pass.
    pub fn submit(&self, action: Option<Action>, mode: Submission) -> DispatchResult<ItemId> {
        let action = action.ok_or(DispatchError::NullAction)?;

        if mode == Submission::Blocking && self.is_owner_thread() {
            return Err(DispatchError::SelfSubmission);
        }

        let completion = match mode {
            Submission::Blocking => Some(Arc::new(Completion::new())),
            Submission::Async => None,
        };

        let id = {
            let mut pending = self.shared.pending.lock();
            if !self.shared.running.load(Ordering::Acquire) {
                return Err(DispatchError::ShutDown);
            }
            // Allocated under the lock so IDs follow queue order
            let id = ItemId::from_u64(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
            pending.push_back(WorkItem::new(id, action, completion.clone()));
            id
        };

        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.wake.set();
        tracing::trace!(dispatcher = %self.shared.label, item = %id, ?mode, "item queued");

        if let Some(completion) = completion {
            completion.wait();
        }

        Ok(id)
    }

    // ========================================================================
    // Drain loop
    // ========================================================================

    /// Run one drain pass without waiting for the wake signal
    ///
    /// A failure escaping the pass's bookkeeping is reported as
    /// [`Failure::Loop`] and returned as [`DispatchError::LoopFault`]; the
    /// next pass removes and releases what the failed pass already executed.
    pub fn drain(&self) -> DispatchResult<DrainReport> {
        let _guard = self.enter_loop()?;
        self.isolated_pass()
    }

    /// Wait up to `timeout` for the wake signal, then run one drain pass
    ///
    /// Cooperative hosts call this from their frame loop; a zero timeout
    /// never blocks. Loop failures are handled as in [`drain`](Self::drain).
    pub fn pump(&self, timeout: Duration) -> DispatchResult<DrainReport> {
        let _guard = self.enter_loop()?;
        self.shared.wake.wait_timeout(timeout);
        self.isolated_pass()
    }

    /// Drive the drain loop on the owner thread until [`shutdown`](Self::shutdown)
    ///
    /// A failure escaping the loop's bookkeeping is reported as
    /// [`Failure::Loop`] and the loop restarts after a doubling backoff.
    /// Items already executed before the failure are not executed again.
    pub fn run(&self) -> DispatchResult<()> {
        let _guard = self.enter_loop()?;
        let mut consecutive: u32 = 0;

        tracing::debug!(dispatcher = %self.shared.label, "drain loop started");

        loop {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drain_loop(&mut consecutive)));

            match outcome {
                Ok(()) => break,
                Err(payload) => {
                    consecutive = consecutive.saturating_add(1);
                    let restarts = self.loop_failed(payload.as_ref());
                    let backoff = self.shared.options.backoff_for(consecutive);

                    tracing::warn!(
                        dispatcher = %self.shared.label,
                        restarts,
                        backoff_ms = backoff.as_millis() as u64,
                        "drain loop failed, restarting"
                    );
                    thread::sleep(backoff);
                }
            }
        }

        tracing::debug!(dispatcher = %self.shared.label, "drain loop stopped");
        Ok(())
    }

    /// Stop accepting submissions and let [`run`](Self::run) return
    ///
    /// Items queued before the call are still executed by the loop's final
    /// pass. A host that drives the loop with `pump` must keep pumping until
    /// the queue is empty.
    pub fn shutdown(&self) {
        {
            let _pending = self.shared.pending.lock();
            self.shared.running.store(false, Ordering::Release);
        }
        self.shared.wake.set();
        tracing::debug!(dispatcher = %self.shared.label, "dispatcher shutting down");
    }

    fn drain_loop(&self, consecutive: &mut u32) {
        loop {
            self.shared.wake.wait_timeout(self.shared.options.poll_interval);

            // Read before the pass: every item accepted before shutdown is
            // then inside this pass's snapshot
            let stopping = !self.shared.running.load(Ordering::Acquire);

            self.drain_pass();
            *consecutive = 0;

            if stopping {
                return;
            }
        }
    }

    /// Execute the items present at the start of the pass, then remove them
    /// and release their submitters in FIFO order
    fn drain_pass(&self) -> DrainReport {
        let snapshot = self.shared.pending.lock().len();
        let mut report = DrainReport::default();

        for index in 0..snapshot {
            let taken = {
                let mut pending = self.shared.pending.lock();
                pending
                    .get_mut(index)
                    .and_then(|item| item.action.take().map(|action| (item.id, action)))
            };

            // Already executed by a pass that failed before removing it
            let (id, action) = match taken {
                Some(taken) => taken,
                None => continue,
            };

            report.executed += 1;
            tracing::trace!(dispatcher = %self.shared.label, item = %id, "executing item");

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
                report.failed += 1;
                self.report(Failure::Action {
                    item: id,
                    message: panic_message(payload.as_ref()),
                });
            }
        }

        if self.take_injected_fault() {
            panic!("injected drain loop fault");
        }

        let finished: Vec<WorkItem> = {
            let mut pending = self.shared.pending.lock();
            let finished = pending.drain(..snapshot).collect();
            report.deferred = pending.len();
            finished
        };

        for item in finished {
            debug_assert!(item.is_taken(), "item {} removed before it ran", item.id);
            if let Some(completion) = item.completion {
                completion.signal();
                report.released += 1;
            }
        }

        let counters = &self.shared.counters;
        counters.executed.fetch_add(report.executed as u64, Ordering::Relaxed);
        counters.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        counters.passes.fetch_add(1, Ordering::Relaxed);

        if report.executed > 0 {
            tracing::debug!(
                dispatcher = %self.shared.label,
                executed = report.executed,
                failed = report.failed,
                released = report.released,
                deferred = report.deferred,
                "drain pass complete"
            );
        }

        report
    }

    fn enter_loop(&self) -> DispatchResult<LoopGuard<'_>> {
        if !self.is_owner_thread() {
            return Err(DispatchError::NotOwnerThread);
        }
        if self.shared.draining.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::ReentrantDrain);
        }
        Ok(LoopGuard {
            draining: &self.shared.draining,
        })
    }

    /// One drain pass for `drain` and `pump`, with the same failure handling
    /// as the supervised loop but without retrying
    fn isolated_pass(&self) -> DispatchResult<DrainReport> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.drain_pass())) {
            Ok(report) => Ok(report),
            Err(payload) => {
                let restarts = self.loop_failed(payload.as_ref());
                tracing::warn!(dispatcher = %self.shared.label, restarts, "drain pass failed");
                Err(DispatchError::LoopFault)
            }
        }
    }

    /// Count and report a loop failure; returns the restart count
    fn loop_failed(&self, payload: &(dyn std::any::Any + Send)) -> u64 {
        let restarts = self.shared.counters.restarts.fetch_add(1, Ordering::Relaxed) + 1;
        self.report(Failure::Loop {
            message: panic_message(payload),
            restarts,
        });
        restarts
    }

    fn report(&self, failure: Failure) {
        let local = self.shared.observer.read().clone();
        failure::report(&failure, local);
    }

    #[cfg(test)]
    fn inject_loop_fault(&self) {
        self.shared.inject_loop_fault.store(true, Ordering::Release);
    }

    #[cfg(test)]
    fn take_injected_fault(&self) -> bool {
        self.shared.inject_loop_fault.swap(false, Ordering::AcqRel)
    }

    #[cfg(not(test))]
    fn take_injected_fault(&self) -> bool {
        false
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherOptions::default())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.shared.label)
            .field("owner", &self.shared.owner)
            .field("running", &self.is_running())
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// Clears the draining flag when a pass or loop ends, including by unwind
struct LoopGuard<'a> {
    draining: &'a AtomicBool,
}

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        self.draining.store(false, Ordering::Release);
    }
}
