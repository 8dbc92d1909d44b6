//! Structured logging with `tracing`.
//!
//! Every liveprobe crate logs through the `tracing` macros with structured
//! fields (`instrument_id`, `unit`, `line`). Binaries embedding the engine
//! call [`init_subscriber`] once; tests use [`capture_logs`] to assert on
//! emitted events.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. Subsequent calls are
/// no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default fails if a subscriber is already installed
    let _ = subscriber.try_init();
}
