//! Per-vendor session lifecycle.
//!
//! # Responsibilities
//! - Own one session record per vendor type (id, timestamps, count,
//!   engagement)
//! - Reconcile the in-memory cache with the durable store on first access
//! - Expire sessions after 30 minutes of no access
//!
//! # Design Decisions
//! - The durable copy is the source of truth across reloads; the in-memory
//!   copy is authoritative within one page life
//! - Cache reconciliation is race-checked: a record created by a concurrent
//!   caller while storage I/O was pending wins over the later one
//! - Engagement is the AND of three independently tracked signals (page
//!   open, document focus, doc visibility); any change recomputes and
//!   persists every cached session

pub mod manager;
pub mod record;

pub use manager::SessionManager;
pub use record::{SessionRecord, SESSION_MAX_AGE_MILLIS, SESSION_STORAGE_PREFIX};
