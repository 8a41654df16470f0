//! Variable and macro expansion engine.
//!
//! # Responsibilities
//! - Resolve `${name}` placeholders against a per-call variable map
//! - Hand `NAME(args)` tokens to the macro registry for resolution
//! - Bound recursion depth and degrade to literal placeholders on overrun
//! - Apply selective percent-encoding that preserves macro call syntax
//!
//! # Design Decisions
//! - The scanner is regex-free and non-nested: an inner `${` inside a span
//!   is not specially parsed (preserved parser limitation, not a bug)
//! - Macro dispatch is an explicit name → handler registry built once at
//!   startup; duplicate registration is a fatal configuration error
//! - Depth exhaustion logs and passes the placeholder through literally so
//!   sibling placeholders still resolve

pub mod context;
pub mod expander;
pub mod macros;

pub use context::ExpansionContext;
pub use expander::Expander;
pub use macros::{MacroRegistry, MacroRegistryBuilder, MacroResolver};
