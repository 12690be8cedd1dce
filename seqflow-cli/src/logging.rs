//! Tracing subscriber initialization.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over the `verbose` flag.
pub fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
