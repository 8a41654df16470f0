//! Recursive template expansion.

use std::sync::Arc;

use futures::future::BoxFuture;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value as JsonValue;

use crate::expansion::context::ExpansionContext;
use crate::expansion::macros::MacroResolver;

/// Percent-encoding set equivalent to `encodeURIComponent`: everything but
/// alphanumerics and `- _ . ! ~ * ' ( )`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a string the way `encodeURIComponent` would.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Resolves `${...}` placeholders against a variable map and a macro
/// resolver, with depth control and selective encode/freeze semantics.
///
/// Deterministic for a fixed variable map and depth: there is no hidden
/// state beyond the injected resolver.
pub struct Expander {
    resolver: Arc<dyn MacroResolver>,
}

impl Expander {
    pub fn new(resolver: Arc<dyn MacroResolver>) -> Self {
        Self { resolver }
    }

    /// Expand every `${...}` span in `template`.
    ///
    /// Spans are non-nested: an inner `${` within a span is not specially
    /// parsed. A span with no closing `}` is emitted literally.
    pub fn expand<'a>(
        &'a self,
        template: &'a str,
        ctx: &'a ExpansionContext,
    ) -> BoxFuture<'a, String> {
        Box::pin(async move {
            if ctx.remaining_depth < 0 {
                tracing::warn!(
                    template,
                    "maximum expansion depth reached, leaving placeholders unexpanded"
                );
                return template.to_string();
            }

            let mut out = String::with_capacity(template.len());
            let mut rest = template;
            while let Some(start) = rest.find("${") {
                out.push_str(&rest[..start]);
                let span = &rest[start + 2..];
                match span.find('}') {
                    Some(end) => {
                        out.push_str(&self.expand_key(&span[..end], ctx).await);
                        rest = &span[end + 1..];
                    }
                    None => {
                        // Unterminated span: literal passthrough.
                        out.push_str(&rest[start..]);
                        rest = "";
                    }
                }
            }
            out.push_str(rest);
            out
        })
    }

    /// Resolve one captured key (the text between `${` and `}`).
    async fn expand_key(&self, key: &str, ctx: &ExpansionContext) -> String {
        let (name, _args, suffix) = parse_key(key);

        // Frozen names survive this pass untouched.
        if ctx.frozen.contains(name) {
            return format!("${{{key}}}");
        }

        match ctx.vars.get(name) {
            // Unknown variable: substitute empty string.
            None => String::new(),

            Some(JsonValue::String(value)) => {
                let child = ctx.child();
                let expanded = self.expand(value, &child).await;
                // Re-append the original argument list so a value that names
                // a macro keeps its call syntax for the resolution step.
                let token = format!("{expanded}{suffix}");
                let resolved = self.resolve_token(token).await;
                if ctx.encode {
                    encode_token(&resolved)
                } else {
                    resolved
                }
            }

            Some(JsonValue::Array(items)) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let part = match item {
                        JsonValue::String(value) => {
                            let child = ctx.child();
                            let expanded = self.expand(value, &child).await;
                            self.resolve_token(expanded).await
                        }
                        // Non-string elements pass through verbatim.
                        JsonValue::Null => String::new(),
                        other => other.to_string(),
                    };
                    parts.push(part);
                }
                if ctx.encode {
                    parts
                        .iter()
                        .map(|p| encode_token(p))
                        .collect::<Vec<_>>()
                        .join(",")
                } else {
                    parts.join(",")
                }
            }

            Some(JsonValue::Null) => String::new(),

            // Nested maps and scalars render as their JSON text.
            Some(other) => {
                let rendered = other.to_string();
                if ctx.encode {
                    encode_token(&rendered)
                } else {
                    rendered
                }
            }
        }
    }

    /// Hand a resolved value to the macro resolver. Tokens the resolver does
    /// not recognize pass through unchanged; a failing macro degrades to the
    /// literal token with a warning.
    async fn resolve_token(&self, token: String) -> String {
        let (name, args, _suffix) = parse_key(&token);
        match self.resolver.resolve(name, &args).await {
            Ok(Some(value)) => value,
            Ok(None) => token,
            Err(err) => {
                tracing::warn!(token, error = %err, "macro resolution failed");
                token
            }
        }
    }
}

/// Split a captured key into `(name, args, suffix)`.
///
/// A key is either a bare name, or `NAME(arglist)` where `NAME` contains no
/// whitespace or parens; anything else (unbalanced parens, free-form text)
/// is an opaque name with an empty arglist. `suffix` is the literal
/// `(arglist)` text, empty for bare names.
fn parse_key(key: &str) -> (&str, Vec<String>, &str) {
    if let Some(open) = key.find('(') {
        let name = &key[..open];
        let suffix = &key[open..];
        if !name.is_empty()
            && !name.contains(char::is_whitespace)
            && !name.contains(')')
            && suffix.ends_with(')')
            && parens_balanced(suffix)
        {
            let inner = &suffix[1..suffix.len() - 1];
            let args = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(|a| a.trim().to_string()).collect()
            };
            return (name, args, suffix);
        }
    }
    (key, Vec::new(), "")
}

fn parens_balanced(s: &str) -> bool {
    let mut depth: i32 = 0;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Percent-encode a resolved value, preserving macro call syntax: a token
/// that parses as `NAME(args)` keeps its `(args)` suffix unescaped.
fn encode_token(value: &str) -> String {
    let (name, _args, suffix) = parse_key(value);
    if suffix.is_empty() {
        encode_component(value)
    } else {
        format!("{}{}", encode_component(name), suffix)
    }
}
