use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize logging with tracing
///
/// Reads the filter from the `RUST_LOG` environment variable if set,
/// falling back to "vocalink=debug,warn".
///
/// # Example
///
/// ```no_run
/// use vocalink::utils::logging::init_logging;
///
/// init_logging();
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vocalink=debug,warn"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("vocalink logging initialized");
}
