//! Tracing setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// Without `--verbose`, `RUST_LOG` applies and defaults to `info`. With it,
/// the Veritas crates log at debug.
pub fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::from_default_env()
            .add_directive("veritas_server=debug".parse().unwrap())
            .add_directive("veritas_ops=debug".parse().unwrap())
            .add_directive("veritas_pay=debug".parse().unwrap())
            .add_directive("veritas_settle=debug".parse().unwrap())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
