//! Destination-domain eligibility.
//!
//! # Responsibilities
//! - Decide whether a destination URL may receive a linker token
//! - Friendly-domain heuristic when no allow-list is configured
//! - Exact and `*`-wildcard matching against an explicit allow-list
//!
//! # Design Decisions
//! - Wildcard matching is regex-free: `*` behaves like an anchored greedy
//!   `.*`, so `*.foo.com` matches `amp.foo.com` and `a.b.foo.com` but not
//!   bare `foo.com`, and a trailing `*` allows suffix continuation
//! - Only http/https destinations qualify; fragment-only or relative
//!   targets have no hostname and are ineligible

use url::Url;

use crate::config::schema::LinkerConfig;

/// Hostnames and flags describing the current page, supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    /// Hostname of the page as loaded.
    pub page_hostname: String,

    /// Hostname of the source (pre-proxy) URL.
    pub source_hostname: String,

    /// Hostname of the canonical URL.
    pub canonical_hostname: String,

    /// Highest cookie-scope domain, when known. Preferred friendly-domain
    /// reference.
    pub cookie_scope_domain: Option<String>,

    /// Whether the page is served from a proxy origin.
    pub served_from_proxy: bool,
}

/// Leading subdomain labels ignored when comparing friendly domains.
const FRIENDLY_PREFIXES: [&str; 3] = ["www", "m", "amp"];

/// Strip any leading run of `www.` / `m.` / `amp.` labels.
fn strip_friendly_prefixes(hostname: &str) -> &str {
    let mut host = hostname;
    loop {
        match host.split_once('.') {
            Some((label, rest))
                if FRIENDLY_PREFIXES.contains(&label) && !rest.is_empty() =>
            {
                host = rest;
            }
            _ => return host,
        }
    }
}

/// Two hostnames are friendly when they are equal after prefix stripping.
fn is_friendly_domain(a: &str, b: &str) -> bool {
    strip_friendly_prefixes(a) == strip_friendly_prefixes(b)
}

/// Anchored wildcard match where `*` is a greedy any-sequence.
pub fn is_wildcard_match(hostname: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return hostname == pattern;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !hostname.starts_with(first) {
        return false;
    }
    let mut rest = &hostname[first.len()..];
    for middle in &parts[1..parts.len() - 1] {
        if middle.is_empty() {
            continue;
        }
        match rest.find(middle) {
            Some(at) => rest = &rest[at + middle.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Decide whether `destination_url` is eligible to receive this config's
/// linker token.
pub fn is_eligible(destination_url: &str, config: &LinkerConfig, page: &PageContext) -> bool {
    let parsed = match Url::parse(destination_url) {
        Ok(url) => url,
        Err(err) => {
            tracing::debug!(destination_url, error = %err, "unparseable destination");
            return false;
        }
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(hostname) = parsed.host_str() else {
        return false;
    };

    match &config.destination_domains {
        Some(domains) => domains
            .iter()
            .any(|d| d == hostname || is_wildcard_match(hostname, d)),
        None => {
            if hostname == page.page_hostname {
                return config.same_domain_enabled;
            }
            match &page.cookie_scope_domain {
                Some(cookie_domain) => is_friendly_domain(hostname, cookie_domain),
                // Fallback pair: either match is sufficient.
                None => {
                    is_friendly_domain(hostname, &page.source_hostname)
                        || is_friendly_domain(hostname, &page.canonical_hostname)
                }
            }
        }
    }
}
