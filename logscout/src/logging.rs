use tracing_subscriber::{fmt, EnvFilter};

/// Installs a stderr `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (e.g. `scanner.log_level`) applies.
/// Calling this more than once is harmless: later calls leave the first subscriber in place.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
