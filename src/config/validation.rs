//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Enforce the batch interval floor and finiteness
//! - Enforce a positive report window
//!
//! # Design Decisions
//! - Validation runs at handler construction; a handler is never built from
//!   invalid pacing values (fatal tier of the error model)
//! - Values are converted to milliseconds here so the rest of the pipeline
//!   only deals in integer millis

use crate::config::schema::BatchInterval;
use crate::error::ConfigError;

/// Smallest accepted batch interval, in milliseconds.
pub const BATCH_INTERVAL_MIN_MS: u64 = 200;

/// Validate a declared batch interval and convert it to milliseconds.
pub fn validate_batch_intervals(interval: &BatchInterval) -> Result<Vec<u64>, ConfigError> {
    let seconds = interval.as_seconds();
    if seconds.is_empty() {
        return Err(ConfigError::EmptyBatchInterval);
    }
    let mut millis = Vec::with_capacity(seconds.len());
    for s in seconds {
        if !s.is_finite() {
            return Err(ConfigError::NonFiniteBatchInterval(s));
        }
        let ms = (s * 1000.0) as u64;
        if ms < BATCH_INTERVAL_MIN_MS {
            return Err(ConfigError::BatchIntervalTooSmall(s));
        }
        millis.push(ms);
    }
    Ok(millis)
}

/// Validate a declared report window and convert it to milliseconds.
pub fn validate_report_window(seconds: f64) -> Result<u64, ConfigError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::InvalidReportWindow(seconds));
    }
    Ok((seconds * 1000.0) as u64)
}
