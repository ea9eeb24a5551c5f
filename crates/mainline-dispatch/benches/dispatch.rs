//! Dispatcher throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mainline_dispatch::{Dispatcher, DispatcherOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn bench_owner_submit_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("owner_submit_drain");

    for items in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, &items| {
            let dispatcher = Dispatcher::default();
            let count = Arc::new(AtomicUsize::new(0));

            b.iter(|| {
                for _ in 0..items {
                    let count = count.clone();
                    dispatcher
                        .submit_async(move || {
                            count.fetch_add(1, Ordering::Relaxed);
                        })
                        .unwrap();
                }
                black_box(dispatcher.drain().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_thread");

    for blocking in [false, true] {
        let name = if blocking { "blocking" } else { "async" };
        group.bench_function(name, |b| {
            let dispatcher =
                Dispatcher::new(DispatcherOptions::new().poll_interval(Duration::from_millis(1)));

            b.iter(|| {
                let done = Arc::new(AtomicUsize::new(0));
                let producer = {
                    let dispatcher = dispatcher.clone();
                    let done = done.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let done = done.clone();
                            let action = move || {
                                done.fetch_add(1, Ordering::Relaxed);
                            };
                            if blocking {
                                dispatcher.submit_blocking(action).unwrap();
                            } else {
                                dispatcher.submit_async(action).unwrap();
                            }
                        }
                    })
                };

                while done.load(Ordering::Relaxed) < 100 {
                    dispatcher.pump(Duration::from_millis(1)).unwrap();
                }
                producer.join().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_owner_submit_drain, bench_cross_thread);
criterion_main!(benches);
