//! Per-call expansion state.

use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// Default maximum nesting depth for variable expansion.
pub const DEFAULT_MAX_DEPTH: i32 = 2;

/// State threaded through one expansion pass.
///
/// `remaining_depth` strictly decreases per nested pass; a pass entered with
/// a negative budget halts, logs, and returns its input unexpanded. Only
/// string leaves of `vars` are macro-eligible.
#[derive(Debug, Clone)]
pub struct ExpansionContext {
    /// Variable map. Values are strings, lists, or nested maps.
    pub vars: HashMap<String, JsonValue>,

    /// Nesting budget for this pass.
    pub remaining_depth: i32,

    /// Whether resolved values are percent-encoded on the way out.
    pub encode: bool,

    /// Names whose placeholders are re-emitted untouched, deferring their
    /// expansion to a later pass (e.g. the extra-params slot of a base URL).
    pub frozen: HashSet<String>,
}

impl ExpansionContext {
    pub fn new(vars: HashMap<String, JsonValue>) -> Self {
        Self {
            vars,
            remaining_depth: DEFAULT_MAX_DEPTH,
            encode: false,
            frozen: HashSet::new(),
        }
    }

    pub fn with_encode(mut self, encode: bool) -> Self {
        self.encode = encode;
        self
    }

    pub fn with_max_depth(mut self, depth: i32) -> Self {
        self.remaining_depth = depth;
        self
    }

    /// Freeze `name` so its placeholder survives this pass.
    pub fn freeze(mut self, name: &str) -> Self {
        self.frozen.insert(name.to_string());
        self
    }

    /// Context for a nested pass: one less depth, inner encoding deferred
    /// to the outer pass.
    pub(crate) fn child(&self) -> Self {
        let mut child = self.clone();
        child.remaining_depth = self.remaining_depth - 1;
        child.encode = false;
        child
    }
}

impl Default for ExpansionContext {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}
