//! Logging infrastructure for fastr.
//!
//! Log lines go to stderr; stdout belongs to command output.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging at the default level (`warn`)
pub fn init() {
    init_with_level("warn")
}

/// Initialize logging from a `-v` count: 0 → warn, 1 → info, 2+ → debug
pub fn init_with_verbosity(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    init_with_level(level)
}

/// Initialize logging with a specific default level
///
/// `RUST_LOG` still wins when set. Calling this twice keeps the first subscriber.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
