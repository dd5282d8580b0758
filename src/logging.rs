//! Logging setup shared by the binaries

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`RUST_LOG` syntax)
pub const LOG_ENV: &str = "LABGATE_LOG";

/// Install a stderr subscriber filtered by `LABGATE_LOG`, falling back to
/// `default_directive`. Calling it twice is harmless.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
