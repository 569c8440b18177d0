// 📜 Logging - tracing subscriber setup
//
// Diagnostics go to stderr so stdout stays clean for command output.
// RUST_LOG overrides the default filter.

use tracing_subscriber::EnvFilter;

/// Default filter for command-line use.
pub const DEFAULT_FILTER: &str = "warn";

/// Initialize tracing for the process. Subsequent calls are no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
