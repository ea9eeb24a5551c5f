//! `mainline demo`: Producers submitting to the main-thread dispatcher.

use crate::output::StyledOutput;
use crossbeam::channel;
use mainline_dispatch::failure::{self, Failure};
use mainline_dispatch::{global, DispatcherOptions};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use termcolor::ColorChoice;

pub struct DemoArgs {
    pub producers: usize,
    pub items: usize,
    pub blocking_ratio: f64,
    pub fail_every: usize,
    pub poll_ms: u64,
}

/// What one producer did
struct ProducerReport {
    blocking: usize,
    asynchronous: usize,
    rejected: usize,
}

pub fn execute(args: DemoArgs, color: ColorChoice) -> anyhow::Result<()> {
    // NaN would pass a clamp and make `gen_bool` panic
    let blocking_ratio = if args.blocking_ratio.is_nan() {
        0.0
    } else {
        args.blocking_ratio.clamp(0.0, 1.0)
    };

    let dispatcher = global::construct(
        DispatcherOptions::new()
            .name("main")
            .poll_interval(Duration::from_millis(args.poll_ms.max(1))),
    );

    let failures = Arc::new(AtomicU64::new(0));
    {
        let failures = failures.clone();
        failure::set_global_observer(Arc::new(move |failure: &Failure| {
            failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%failure, "action failed");
        }));
    }

    // Failures are reported through the observer; keep the default hook quiet
    if args.fail_every > 0 {
        std::panic::set_hook(Box::new(|info| tracing::debug!(%info, "panic caught")));
    }

    tracing::info!(
        producers = args.producers,
        items = args.items,
        blocking_ratio,
        "starting producers"
    );

    let (executed_tx, executed_rx) = channel::unbounded::<(usize, usize)>();
    let (report_tx, report_rx) = channel::unbounded::<ProducerReport>();
    let started = Instant::now();

    let producers: Vec<_> = (0..args.producers)
        .map(|producer| {
            let executed_tx = executed_tx.clone();
            let report_tx = report_tx.clone();
            let items = args.items;
            let fail_every = args.fail_every;

            thread::Builder::new()
                .name(format!("producer-{}", producer))
                .spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut report = ProducerReport {
                        blocking: 0,
                        asynchronous: 0,
                        rejected: 0,
                    };

                    for seq in 0..items {
                        let executed_tx = executed_tx.clone();
                        let fails = fail_every > 0 && (seq + 1) % fail_every == 0;
                        let action = move || {
                            if fails {
                                panic!("producer {} item {} failed on purpose", producer, seq);
                            }
                            let _ = executed_tx.send((producer, seq));
                        };

                        let result = if rng.gen_bool(blocking_ratio) {
                            report.blocking += 1;
                            global::submit_blocking(action)
                        } else {
                            report.asynchronous += 1;
                            global::submit_async(action)
                        };

                        if let Err(e) = result {
                            tracing::error!(producer, seq, error = %e, "submission rejected");
                            report.rejected += 1;
                        }
                    }

                    let _ = report_tx.send(report);
                })
        })
        .collect::<Result<_, _>>()?;

    drop(executed_tx);
    drop(report_tx);

    let stopper = thread::Builder::new()
        .name("stopper".to_string())
        .spawn(move || {
            for producer in producers {
                if producer.join().is_err() {
                    tracing::error!("producer thread panicked");
                }
            }
            global::shutdown();
        })?;

    dispatcher.run()?;
    if stopper.join().is_err() {
        anyhow::bail!("stopper thread panicked");
    }
    let elapsed = started.elapsed();

    let executed: Vec<(usize, usize)> = executed_rx.try_iter().collect();
    let reports: Vec<ProducerReport> = report_rx.try_iter().collect();

    // Each producer's surviving items must have run in submission order
    let mut last_seq: Vec<Option<usize>> = vec![None; args.producers];
    let mut fifo = true;
    for &(producer, seq) in &executed {
        if let Some(previous) = last_seq[producer] {
            fifo &= previous < seq;
        }
        last_seq[producer] = Some(seq);
    }

    let stats = dispatcher.stats();
    let failed = failures.load(Ordering::Relaxed);
    let accounted = executed.len() as u64 + failed == stats.submitted;

    let mut out = StyledOutput::new(color);
    out.bold("Dispatcher report");
    out.newline();
    out.row("producers", args.producers);
    out.row("blocking", reports.iter().map(|r| r.blocking).sum::<usize>());
    out.row("async", reports.iter().map(|r| r.asynchronous).sum::<usize>());
    out.row("rejected", reports.iter().map(|r| r.rejected).sum::<usize>());
    out.row("submitted", stats.submitted);
    out.row("executed", stats.executed);
    out.row("failed", failed);
    out.row("passes", stats.passes);
    out.row("restarts", stats.restarts);
    out.row("elapsed", format!("{:.2?}", elapsed));
    out.verdict(fifo, "per-producer FIFO order");
    out.verdict(accounted, "every submitted item ran exactly once");
    out.flush();

    if !(fifo && accounted) {
        anyhow::bail!("dispatcher invariants violated");
    }
    Ok(())
}
