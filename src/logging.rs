//! Logging setup for binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the host. `RUST_LOG` overrides the default `info` filter.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a stderr fmt subscriber.
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}
