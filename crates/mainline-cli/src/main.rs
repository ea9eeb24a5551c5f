//! Mainline demonstration host
//!
//! Designates the process main thread as the dispatcher's owner and drives
//! it while producer threads submit work.

mod commands;
mod output;
mod trace;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mainline")]
#[command(about = "Main-thread affinity dispatcher demo host", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "mainline=debug"
    #[arg(long, global = true)]
    log: Option<String>,

    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run producers against a dispatcher owned by the main thread
    Demo {
        /// Number of producer threads (defaults to the CPU count)
        #[arg(short, long)]
        producers: Option<usize>,
        /// Actions submitted per producer
        #[arg(short, long, default_value_t = 100)]
        items: usize,
        /// Probability that a submission blocks
        #[arg(short, long, default_value_t = 0.25, value_parser = parse_ratio)]
        blocking_ratio: f64,
        /// Make every K-th action of each producer panic (0 disables)
        #[arg(short, long, default_value_t = 0)]
        fail_every: usize,
        /// Drain loop poll interval in milliseconds
        #[arg(long, default_value_t = 25)]
        poll_ms: u64,
    },

    /// Print successive per-thread delta times
    Delta {
        /// Number of samples
        #[arg(short, long, default_value_t = 5)]
        samples: usize,
        /// Sleep between samples in milliseconds
        #[arg(short, long, default_value_t = 100)]
        interval_ms: u64,
    },
}

/// Parse a probability in `[0, 1]`; rejects NaN and infinities
fn parse_ratio(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{} is not a ratio between 0 and 1", s));
    }
    Ok(value)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    trace::init_tracing(cli.log.as_deref());
    let color = output::resolve_color_choice(cli.color.as_deref());

    match cli.command {
        Commands::Demo {
            producers,
            items,
            blocking_ratio,
            fail_every,
            poll_ms,
        } => commands::demo::execute(
            commands::demo::DemoArgs {
                producers: producers.unwrap_or_else(num_cpus::get),
                items,
                blocking_ratio,
                fail_every,
                poll_ms,
            },
            color,
        ),

        Commands::Delta {
            samples,
            interval_ms,
        } => commands::delta::execute(samples, interval_ms),
    }
}
