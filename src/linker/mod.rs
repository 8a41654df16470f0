//! Cross-domain identity linker.
//!
//! # Responsibilities
//! - Encode/decode the versioned, checksummed linker token (codec)
//! - Decide whether a destination URL may receive a token (domain matcher)
//! - Orchestrate both against outbound navigation events (manager)
//!
//! # Design Decisions
//! - The wire format is bit-exact and must interoperate with any reader of
//!   the same scheme: `version '*' checksum ('*' key '*' base64url(value))*`
//! - Checksum mismatches and malformed tokens decode to `None`, never a
//!   panic: a forged URL parameter must not break page load
//! - Identity values are expanded once at manager init and read-only
//!   afterwards

pub mod codec;
pub mod domain;
pub mod manager;

pub use codec::{decode, encode, PageFingerprint, LINKER_VERSION};
pub use domain::{is_eligible, is_wildcard_match, PageContext};
pub use manager::{LinkerManager, NavigationEventType};
