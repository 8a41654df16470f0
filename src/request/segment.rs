//! Batch segments: one trigger event's resolved payload.

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::expansion::{Expander, ExpansionContext};

/// One event's resolved extra parameters plus trigger name and timestamp,
/// queued for delivery. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchSegment {
    /// Name of the trigger that produced this segment.
    pub trigger: Option<String>,

    /// Send-time timestamp in epoch milliseconds.
    #[serde(rename = "timestampMillis")]
    pub timestamp_millis: u64,

    /// Resolved extra URL parameters.
    #[serde(rename = "extraUrlParams")]
    pub extra_url_params: JsonValue,
}

/// Merge config-level and trigger-level params. Both are expected to be
/// JSON objects; trigger keys win on conflict. Non-object inputs are
/// treated as empty.
pub fn merge_params(config_params: &JsonValue, trigger_params: &JsonValue) -> JsonValue {
    let mut merged = serde_json::Map::new();
    if let JsonValue::Object(map) = config_params {
        merged.extend(map.clone());
    }
    if let JsonValue::Object(map) = trigger_params {
        merged.extend(map.clone());
    }
    JsonValue::Object(merged)
}

/// Expand every string leaf of `value` through the engine, recursing into
/// nested lists and objects. Encoding is left to serialization.
pub fn expand_json_leaves<'a>(
    expander: &'a Expander,
    value: &'a JsonValue,
    ctx: &'a ExpansionContext,
) -> BoxFuture<'a, JsonValue> {
    Box::pin(async move {
        match value {
            JsonValue::String(s) => JsonValue::String(expander.expand(s, ctx).await),
            JsonValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(expand_json_leaves(expander, item, ctx).await);
                }
                JsonValue::Array(out)
            }
            JsonValue::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key.clone(), expand_json_leaves(expander, item, ctx).await);
                }
                JsonValue::Object(out)
            }
            other => other.clone(),
        }
    })
}

/// Owned variant of [`expand_json_leaves`] for building `'static` segment
/// futures.
pub(crate) async fn expand_params_owned(
    expander: Arc<Expander>,
    params: JsonValue,
    ctx: ExpansionContext,
) -> JsonValue {
    expand_json_leaves(&expander, &params, &ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::MacroRegistryBuilder;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_trigger_params_win_on_conflict() {
        let merged = merge_params(
            &json!({"a": "config", "b": "config"}),
            &json!({"b": "trigger", "c": "trigger"}),
        );
        assert_eq!(
            merged,
            json!({"a": "config", "b": "trigger", "c": "trigger"})
        );
    }

    #[test]
    fn test_non_object_params_treated_as_empty() {
        assert_eq!(merge_params(&JsonValue::Null, &json!({"a": 1})), json!({"a": 1}));
        assert_eq!(merge_params(&json!("str"), &JsonValue::Null), json!({}));
    }

    #[tokio::test]
    async fn test_leaf_expansion_recurses_into_nested_values() {
        let expander = Expander::new(Arc::new(MacroRegistryBuilder::new().build()));
        let mut vars = HashMap::new();
        vars.insert("v".to_string(), json!("resolved"));
        let ctx = ExpansionContext::new(vars);

        let input = json!({
            "plain": 3,
            "leaf": "${v}",
            "nested": {"inner": "${v}"},
            "list": ["${v}", 7]
        });
        let out = expand_json_leaves(&expander, &input, &ctx).await;
        assert_eq!(
            out,
            json!({
                "plain": 3,
                "leaf": "resolved",
                "nested": {"inner": "resolved"},
                "list": ["resolved", 7]
            })
        );
    }
}
