//! Configuration schema definitions.
//!
//! This module defines the declarative inputs of the pipeline. All types
//! derive Serde traits for deserialization from merged analytics configs.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A declared request template. One [`RequestHandler`](crate::RequestHandler)
/// is built per template.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestTemplate {
    /// Base URL, possibly templated (`${...}` placeholders allowed).
    #[serde(rename = "baseUrl")]
    pub base_url: String,

    /// Optional request origin. When present, only its scheme + host are
    /// used and `base_url` may be root-relative.
    #[serde(default)]
    pub origin: Option<String>,

    /// Batch pacing in seconds: a scalar, or an ordered list that is walked
    /// once and then repeats its last value ("fast at first, slower later").
    #[serde(default, rename = "batchInterval")]
    pub batch_interval: Option<BatchInterval>,

    /// Absolute cutoff in seconds from handler construction, after which
    /// only `important` triggers are delivered.
    #[serde(default, rename = "reportWindow")]
    pub report_window: Option<f64>,
}

/// Scalar-or-list form of the batch interval, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BatchInterval {
    Single(f64),
    Multiple(Vec<f64>),
}

impl BatchInterval {
    /// View as a slice of seconds regardless of declared shape.
    pub fn as_seconds(&self) -> Vec<f64> {
        match self {
            BatchInterval::Single(s) => vec![*s],
            BatchInterval::Multiple(list) => list.clone(),
        }
    }
}

/// One observed trigger event, as delivered by the host trigger layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TriggerEvent {
    /// Trigger name (e.g. "click", "visible", "pageview").
    pub name: String,

    /// Important triggers bypass batching and a closed report window.
    #[serde(default)]
    pub important: bool,

    /// Extra URL parameters carried by the trigger. Keys here win over the
    /// config-level parameters on conflict.
    #[serde(default, rename = "extraUrlParams")]
    pub extra_url_params: JsonValue,
}

/// A named linker configuration entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkerConfig {
    /// Whether this entry attaches tokens at all.
    #[serde(default)]
    pub enabled: bool,

    /// Identity ids to carry, values possibly templated. Expanded once at
    /// manager init.
    #[serde(default)]
    pub ids: BTreeMap<String, String>,

    /// Explicit destination allow-list (exact hostnames or `*` wildcards).
    /// Absent means the friendly-domain heuristic applies.
    #[serde(default, rename = "destinationDomains")]
    pub destination_domains: Option<Vec<String>>,

    /// Only attach tokens when the page is served from a proxy origin.
    #[serde(default = "default_true", rename = "proxyOnly")]
    pub proxy_only: bool,

    /// Allow decorating same-hostname destinations.
    #[serde(default, rename = "sameDomainEnabled")]
    pub same_domain_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ids: BTreeMap::new(),
            destination_domains: None,
            proxy_only: true,
            same_domain_enabled: false,
        }
    }
}
