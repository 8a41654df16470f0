//! Error types for the pipeline.
//!
//! Three tiers of failure:
//! - Fatal construction-time errors (`ConfigError`): returned from
//!   constructors/builders so an inconsistent handler or registry is never
//!   used.
//! - Recoverable errors (`ExpansionError`, `StorageError`): logged by the
//!   caller, the operation degrades to empty/skip/pass.
//! - Transport failures: swallowed with a warning at the transport boundary;
//!   delivery is best-effort and never retried here.

use thiserror::Error;

/// Fatal configuration errors raised while building a component.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A batch interval entry was not a finite number of seconds.
    #[error("batch interval must be a finite number, got {0}")]
    NonFiniteBatchInterval(f64),

    /// A batch interval entry was below the 200 ms floor.
    #[error("batch interval {0}s is below the minimum of 0.2s")]
    BatchIntervalTooSmall(f64),

    /// An empty batch interval list was supplied.
    #[error("batch interval list must not be empty")]
    EmptyBatchInterval,

    /// The report window was not a positive finite number of seconds.
    #[error("report window must be a positive finite number, got {0}")]
    InvalidReportWindow(f64),

    /// A macro name was registered twice.
    #[error("duplicate macro registration: {0}")]
    DuplicateMacro(String),
}

/// Recoverable failures while resolving a macro.
#[derive(Debug, Error)]
pub enum ExpansionError {
    /// The macro handler itself reported a failure.
    #[error("macro '{name}' failed: {reason}")]
    MacroFailed { name: String, reason: String },
}

/// Recoverable failures at the durable store boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store could not complete the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be deserialized.
    #[error("corrupt stored value for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}
