//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem once per process
//! - Honor `RUST_LOG`-style filtering with a sane default
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - Recoverable degradation logs at `warn`, fatal construction paths at
//!   `error`, per-event chatter at `debug`

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset (e.g. "info",
/// "tagflow=debug"). Calling this twice is a no-op.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
