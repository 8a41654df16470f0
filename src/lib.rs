//! In-page analytics pipeline core.
//!
//! Turns declarative trigger events into outbound measurement requests:
//! templated variables and macros are expanded into literal values, requests
//! are batched and paced before delivery, cross-domain navigations can carry
//! a checksummed identity token ("linker"), and a lightweight session record
//! is tracked per vendor.
//!
//! # Architecture Overview
//!
//! ```text
//!   trigger event ──▶ request::RequestHandler ──▶ Serializer ──▶ Transport
//!                          │     ▲
//!                          ▼     │
//!                  expansion::Expander ◀── MacroRegistry
//!                          ▲
//!                          │
//!   navigation ──▶ linker::LinkerManager ──▶ codec + domain matcher
//!
//!   session::SessionManager ◀──▶ Storage (durable key/value)
//! ```
//!
//! Host concerns (trigger detection, config fetching/merging, cookie I/O,
//! DOM observation) stay outside this crate and plug in through the
//! `Transport`, `Storage` and macro seams.

// Core engines
pub mod expansion;
pub mod linker;
pub mod request;
pub mod session;

// Boundaries & plumbing
pub mod config;
pub mod scheduler;
pub mod storage;
pub mod transport;

// Cross-cutting concerns
pub mod error;
pub mod observability;

pub use config::schema::{LinkerConfig, RequestTemplate, TriggerEvent};
pub use error::{ConfigError, ExpansionError, StorageError};
pub use expansion::{Expander, ExpansionContext, MacroRegistry};
pub use linker::{LinkerManager, PageContext};
pub use request::RequestHandler;
pub use session::SessionManager;
