//! Host logging sink.
//!
//! All kernel and engine code logs through `tracing` macros; the host (or a
//! test harness) installs the subscriber once at startup.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// `default_filter` is used when `RUST_LOG` is unset (e.g. `"info"` or
/// `"kiln_plugins=debug"`). Safe to call more than once; subsequent calls
/// are no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
