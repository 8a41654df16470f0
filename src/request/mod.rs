//! Request batching and dispatch.
//!
//! # States
//! - Idle: queue empty
//! - Queued: at least one segment buffered
//! - Dispatching: flush in flight
//! - back to Idle; a parallel report-open/report-closed flag gates whether
//!   non-important triggers are accepted at all
//!
//! # State Transitions
//! ```text
//! Idle → Queued: send() accepted
//! Queued → Dispatching: interval tick, important trigger, or no interval
//! Dispatching → Idle: flush resolved and handed to the transport
//! ReportOpen → ReportClosed: report window expiry (one final flush)
//! ```
//!
//! # Design Decisions
//! - One handler per declared request template
//! - Segments are enqueued as deferred completions and resolved at flush;
//!   enqueue order is serialization order, never reordered across a flush
//! - Timers go through the scheduler seam so pacing is testable on a
//!   virtual clock

pub mod handler;
pub mod segment;
pub mod serializer;

pub use handler::RequestHandler;
pub use segment::BatchSegment;
pub use serializer::{compose_request_url, QueryStringSerializer, Serializer};
