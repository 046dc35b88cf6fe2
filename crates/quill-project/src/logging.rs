//! Logging bootstrap for hosts embedding the engine.

use tracing_subscriber::EnvFilter;

/// Installs a stderr `tracing` subscriber filtered by `QUILL_LOG` (falling
/// back to `info`). Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_env("QUILL_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
