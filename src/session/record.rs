//! Session record shape and expiry rule.

use serde::{Deserialize, Serialize};

/// Sessions expire after 30 minutes without access.
pub const SESSION_MAX_AGE_MILLIS: u64 = 30 * 60 * 1000;

/// Durable-store key prefix; the full key is `"amp-session:" + vendor`.
pub const SESSION_STORAGE_PREFIX: &str = "amp-session:";

/// One vendor's session, serialized as a flat map in the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "sessionId")]
    pub session_id: u64,

    #[serde(rename = "creationTimestamp")]
    pub creation_timestamp: u64,

    #[serde(rename = "accessTimestamp")]
    pub access_timestamp: u64,

    /// Last time this vendor observed a business event, independent of
    /// engagement.
    #[serde(rename = "eventTimestamp", skip_serializing_if = "Option::is_none")]
    pub event_timestamp: Option<u64>,

    /// How many sessions this vendor has seen, including this one.
    pub count: u64,

    pub engaged: bool,
}

impl SessionRecord {
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.access_timestamp) > SESSION_MAX_AGE_MILLIS
    }
}

/// Durable-store key for a vendor's session.
pub fn storage_key(vendor_type: &str) -> String {
    format!("{SESSION_STORAGE_PREFIX}{vendor_type}")
}
