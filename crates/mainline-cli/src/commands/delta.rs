//! `mainline delta`: Print per-thread delta times.

use mainline_dispatch::delta_time;
use std::thread;
use std::time::Duration;

pub fn execute(samples: usize, interval_ms: u64) -> anyhow::Result<()> {
    // Starts this thread's clock
    delta_time();

    for sample in 1..=samples {
        thread::sleep(Duration::from_millis(interval_ms));
        println!("sample {:>3}: {:.4}s", sample, delta_time());
    }
    Ok(())
}
