//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters for delivery and session activity)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Whatever metrics exporter the host installs
//! ```
//!
//! # Design Decisions
//! - Structured logging via tracing; targets equal module paths
//! - Metrics go through the `metrics` facade; exporter wiring is the
//!   host's concern
//! - Metric updates are cheap (atomic increments)

pub mod logging;
pub mod metrics;
