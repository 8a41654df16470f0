//! Request serialization: segments → final request URL.

use serde_json::Value as JsonValue;
use url::{Origin, Url};

use crate::expansion::expander::encode_component;
use crate::request::segment::BatchSegment;

/// Placeholder the base URL uses for per-segment parameters. Frozen during
/// base-URL expansion and substituted here.
pub const EXTRA_URL_PARAMS_PLACEHOLDER: &str = "${extraUrlParams}";

/// Turns a composed base URL and the resolved segments into the final
/// request handed to the transport.
pub trait Serializer: Send + Sync {
    fn generate(&self, base_url: &str, segments: &[BatchSegment]) -> String;
}

/// Default serializer: renders each segment's params as percent-encoded
/// query parameters, joins segments with `&`, and substitutes the frozen
/// extra-params slot (or appends when the base URL has no slot).
#[derive(Debug, Default)]
pub struct QueryStringSerializer;

impl Serializer for QueryStringSerializer {
    fn generate(&self, base_url: &str, segments: &[BatchSegment]) -> String {
        let rendered: Vec<String> = segments
            .iter()
            .map(|s| render_query_params(&s.extra_url_params))
            .filter(|q| !q.is_empty())
            .collect();
        let params = rendered.join("&");

        if base_url.contains(EXTRA_URL_PARAMS_PLACEHOLDER) {
            let url = base_url.replace(EXTRA_URL_PARAMS_PLACEHOLDER, &params);
            // Substituting an empty param set can leave a dangling separator.
            url.trim_end_matches(['?', '&']).to_string()
        } else if params.is_empty() {
            base_url.to_string()
        } else if base_url.contains('?') {
            format!("{base_url}&{params}")
        } else {
            format!("{base_url}?{params}")
        }
    }
}

/// Render a JSON object as `k=v&k2=v2` with component encoding. Arrays
/// repeat the key per element; null values are skipped; nested objects
/// render as their JSON text.
fn render_query_params(params: &JsonValue) -> String {
    let JsonValue::Object(map) = params else {
        return String::new();
    };
    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        match value {
            JsonValue::Null => {}
            JsonValue::Array(items) => {
                for item in items {
                    pairs.push(render_pair(key, item));
                }
            }
            other => pairs.push(render_pair(key, other)),
        }
    }
    pairs.join("&")
}

fn render_pair(key: &str, value: &JsonValue) -> String {
    let text = match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("{}={}", encode_component(key), encode_component(&text))
}

/// Compose the request URL from an expanded base URL and optional origin.
///
/// When an origin is present only its scheme + host are used (trailing
/// paths are ignored), allowing `base_url` to be absolute or root-relative.
pub fn compose_request_url(base_url: &str, origin: Option<&str>) -> String {
    let Some(origin) = origin else {
        return base_url.to_string();
    };
    match Url::parse(origin) {
        Ok(parsed) => match parsed.origin() {
            Origin::Tuple(..) => {
                format!("{}{}", parsed.origin().ascii_serialization(), base_url)
            }
            Origin::Opaque(_) => {
                tracing::warn!(origin, "request origin has no usable scheme+host, ignoring");
                base_url.to_string()
            }
        },
        Err(err) => {
            tracing::warn!(origin, error = %err, "invalid request origin, ignoring");
            base_url.to_string()
        }
    }
}
