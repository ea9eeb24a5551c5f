//! Log subscriber setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "mainline=info,mainline_dispatch=info";

/// Install the global subscriber
///
/// Filter priority: `--log` flag > `RUST_LOG` > [`DEFAULT_FILTER`].
pub fn init_tracing(flag: Option<&str>) {
    let filter = match flag {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_writer(std::io::stderr)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .init();
}
