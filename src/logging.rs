//! Diagnostic logging to stderr.
//!
//! `WITR_LOG` takes precedence over `RUST_LOG`; without either the level
//! comes from the `-v` count.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "WITR_LOG";

/// Default directive for a given number of `-v` flags.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "witr=warn",
        1 => "witr=debug",
        _ => "witr=trace",
    }
}

fn filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbosity: u8, ansi: bool) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_ansi(ansi);

    let _ = tracing_subscriber::registry()
        .with(filter(verbosity))
        .with(layer)
        .try_init();
}
