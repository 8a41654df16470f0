//! Pipeline configuration.
//!
//! Schema structs mirror the JSON the host layer hands over after it has
//! fetched and merged vendor/remote/inline configs; fetching and merging
//! themselves stay outside this crate.

pub mod schema;
pub mod validation;

pub use schema::{BatchInterval, LinkerConfig, RequestTemplate, TriggerEvent};
pub use validation::{validate_batch_intervals, validate_report_window, BATCH_INTERVAL_MIN_MS};
