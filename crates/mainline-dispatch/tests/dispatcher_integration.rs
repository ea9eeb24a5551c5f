//! Integration tests for the owner-thread dispatcher

use mainline_dispatch::{
    DispatchError, Dispatcher, DispatcherOptions, Failure, FailureObserver,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn fast_dispatcher() -> Dispatcher {
    Dispatcher::new(
        DispatcherOptions::new()
            .name("test-owner")
            .poll_interval(Duration::from_millis(5)),
    )
}

fn recording_observer(dispatcher: &Dispatcher) -> Arc<Mutex<Vec<Failure>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer: Arc<dyn FailureObserver> =
        Arc::new(move |failure: &Failure| sink.lock().push(failure.clone()));
    dispatcher.set_failure_observer(observer);
    seen
}

/// Drive the loop on this (owner) thread until every producer has finished
fn run_until_done(dispatcher: &Dispatcher, producers: Vec<JoinHandle<()>>) {
    let stopper = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || {
            for producer in producers {
                producer.join().expect("producer panicked");
            }
            dispatcher.shutdown();
        })
    };

    dispatcher.run().unwrap();
    stopper.join().unwrap();
}

#[test]
fn test_async_abc_single_pass() {
    let dispatcher = fast_dispatcher();
    let order = Arc::new(Mutex::new(Vec::new()));

    let producer = {
        let dispatcher = dispatcher.clone();
        let order = order.clone();
        thread::spawn(move || {
            for name in ["A", "B", "C"] {
                let order = order.clone();
                dispatcher
                    .submit_async(move || order.lock().push(name))
                    .unwrap();
            }
        })
    };
    producer.join().unwrap();

    let report = dispatcher.pump(Duration::from_millis(100)).unwrap();

    assert_eq!(*order.lock(), vec!["A", "B", "C"]);
    assert_eq!(report.executed, 3);
    assert_eq!(report.deferred, 0);
    assert_eq!(dispatcher.pending_len(), 0);
}

#[test]
fn test_fifo_interleaved_producers() {
    let dispatcher = fast_dispatcher();
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let executed = Arc::new(Mutex::new(Vec::new()));

    let producers = (0..4)
        .map(|producer| {
            let dispatcher = dispatcher.clone();
            let submitted = submitted.clone();
            let executed = executed.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for n in 0..50 {
                    let tag = (producer, n);
                    let executed = executed.clone();
                    let action = move || executed.lock().push(tag);

                    // Holding the ticket lock fixes the submission order
                    let mut ticket = submitted.lock();
                    ticket.push(tag);
                    if rng.gen_bool(0.3) {
                        dispatcher.submit_blocking(action).unwrap();
                    } else {
                        dispatcher.submit_async(action).unwrap();
                    }
                }
            })
        })
        .collect();

    run_until_done(&dispatcher, producers);

    assert_eq!(executed.lock().len(), 200);
    assert_eq!(*executed.lock(), *submitted.lock());
}

#[test]
fn test_each_item_runs_exactly_once() {
    let dispatcher = fast_dispatcher();
    let counters = Arc::new(Mutex::new(Vec::new()));

    let producers = (0..8)
        .map(|producer| {
            let dispatcher = dispatcher.clone();
            let counters = counters.clone();
            thread::spawn(move || {
                for n in 0..100 {
                    let runs = Arc::new(AtomicUsize::new(0));
                    counters.lock().push(runs.clone());
                    let action = move || {
                        runs.fetch_add(1, Ordering::SeqCst);
                    };
                    if (producer + n) % 3 == 0 {
                        dispatcher.submit_blocking(action).unwrap();
                    } else {
                        dispatcher.submit_async(action).unwrap();
                    }
                }
            })
        })
        .collect();

    run_until_done(&dispatcher, producers);

    let counters = counters.lock();
    assert_eq!(counters.len(), 800);
    assert!(counters.iter().all(|runs| runs.load(Ordering::SeqCst) == 1));
    assert_eq!(dispatcher.stats().submitted, 800);
    assert_eq!(dispatcher.stats().executed, 800);
}

#[test]
fn test_blocking_returns_after_action_finished() {
    let dispatcher = fast_dispatcher();
    let observed = Arc::new(AtomicUsize::new(0));

    let producers = (0..4)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let observed = observed.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let finished = Arc::new(AtomicBool::new(false));
                    let flag = finished.clone();
                    dispatcher
                        .submit_blocking(move || {
                            thread::sleep(Duration::from_micros(200));
                            flag.store(true, Ordering::SeqCst);
                        })
                        .unwrap();
                    assert!(finished.load(Ordering::SeqCst), "returned before the action ran");
                    observed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    run_until_done(&dispatcher, producers);

    assert_eq!(observed.load(Ordering::SeqCst), 100);
    assert_eq!(dispatcher.pending_len(), 0);
}

#[test]
fn test_blocking_item_removed_before_release() {
    let dispatcher = fast_dispatcher();

    let producer = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || {
            dispatcher.submit_blocking(|| {}).unwrap();
            let pending = dispatcher.pending_len();
            dispatcher.shutdown();
            pending
        })
    };

    dispatcher.run().unwrap();
    assert_eq!(producer.join().unwrap(), 0);
}

#[test]
fn test_self_submission_does_not_deadlock() {
    let dispatcher = fast_dispatcher();
    let nested = Arc::new(Mutex::new(None));

    let inner = dispatcher.clone();
    let sink = nested.clone();
    let producer = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || {
            dispatcher
                .submit_blocking(move || {
                    *sink.lock() = Some(inner.submit_blocking(|| {}));
                })
                .unwrap();
            dispatcher.shutdown();
        })
    };

    dispatcher.run().unwrap();
    producer.join().unwrap();

    assert_eq!(*nested.lock(), Some(Err(DispatchError::SelfSubmission)));
    assert_eq!(
        dispatcher.submit_blocking(|| {}),
        Err(DispatchError::SelfSubmission)
    );
}

#[test]
fn test_failing_action_does_not_stop_queue() {
    let dispatcher = fast_dispatcher();
    let failures = recording_observer(&dispatcher);
    let after = Arc::new(AtomicUsize::new(0));

    let failing = dispatcher.submit_async(|| panic!("first item broke")).unwrap();
    for _ in 0..3 {
        let after = after.clone();
        dispatcher
            .submit_async(move || {
                after.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let report = dispatcher.drain().unwrap();

    assert_eq!(report.executed, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(after.load(Ordering::SeqCst), 3);

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].item(), Some(failing));
    assert_eq!(failures[0].message(), "first item broke");
}

#[test]
fn test_failing_blocking_action_still_releases_caller() {
    let dispatcher = fast_dispatcher();
    let failures = recording_observer(&dispatcher);

    let producer = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || {
            let result = dispatcher.submit_blocking(|| panic!("blocking item broke"));
            dispatcher.shutdown();
            result
        })
    };

    dispatcher.run().unwrap();
    let id = producer.join().unwrap().unwrap();

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].item(), Some(id));
}

#[test]
fn test_item_submitted_during_pass_waits_for_next_pass() {
    let dispatcher = fast_dispatcher();
    let b_ran = Arc::new(AtomicBool::new(false));
    let b_ran_when_a_returned = Arc::new(Mutex::new(None));

    {
        let inner = dispatcher.clone();
        let b_ran = b_ran.clone();
        let witness = b_ran_when_a_returned.clone();
        dispatcher
            .submit_async(move || {
                let flag = b_ran.clone();
                inner
                    .submit_async(move || flag.store(true, Ordering::SeqCst))
                    .unwrap();
                *witness.lock() = Some(b_ran.load(Ordering::SeqCst));
            })
            .unwrap();
    }

    let first = dispatcher.drain().unwrap();
    assert_eq!(first.executed, 1);
    assert_eq!(first.deferred, 1);
    assert_eq!(*b_ran_when_a_returned.lock(), Some(false));
    assert!(!b_ran.load(Ordering::SeqCst));

    let second = dispatcher.drain().unwrap();
    assert_eq!(second.executed, 1);
    assert!(b_ran.load(Ordering::SeqCst));
    assert_eq!(dispatcher.pending_len(), 0);
}

#[test]
fn test_empty_pump_times_out() {
    let dispatcher = fast_dispatcher();
    let report = dispatcher.pump(Duration::from_millis(10)).unwrap();
    assert_eq!(report.executed, 0);
    assert_eq!(dispatcher.stats().passes, 1);
}

#[test]
fn test_submission_after_shutdown_rejected() {
    let dispatcher = fast_dispatcher();
    dispatcher.shutdown();
    dispatcher.run().unwrap();

    assert_eq!(dispatcher.submit_async(|| {}), Err(DispatchError::ShutDown));
    assert!(!dispatcher.is_running());
}
