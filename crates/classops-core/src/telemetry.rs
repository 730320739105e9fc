//! Tracing setup for the classops binary
//!
//! `RUST_LOG` wins when set; otherwise the level passed by the CLI
//! (`--verbose` maps to debug) is used. Installing twice is harmless:
//! the second call is a no-op.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber, as human-readable lines or (`json`)
/// newline-delimited JSON.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let format = fmt::layer().with_target(false);
    let format = if json {
        format.json().boxed()
    } else {
        format.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
        .ok();
}
