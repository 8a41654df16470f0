//! Linker orchestration against outbound navigation events.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use url::Url;

use crate::config::schema::LinkerConfig;
use crate::expansion::{Expander, ExpansionContext};
use crate::linker::codec::{self, PageFingerprint, LINKER_VERSION};
use crate::linker::domain::{is_eligible, PageContext};
use crate::observability::metrics;
use crate::scheduler::Clock;

/// Outbound event kinds that can carry a linker token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEventType {
    AnchorClick,
    Navigate,
    FormSubmit,
}

/// Orchestrates the codec and domain matcher: identity values are expanded
/// once at init, then every navigation event is checked synchronously and
/// decorated at most once.
pub struct LinkerManager {
    expander: Arc<Expander>,
    clock: Arc<dyn Clock>,
    configs: BTreeMap<String, LinkerConfig>,
    page: PageContext,
    fingerprint: PageFingerprint,
    /// Written once by `init`, read-only on every navigation afterwards.
    resolved_ids: ArcSwap<HashMap<String, Vec<(String, String)>>>,
}

impl LinkerManager {
    pub fn new(
        configs: BTreeMap<String, LinkerConfig>,
        page: PageContext,
        fingerprint: PageFingerprint,
        expander: Arc<Expander>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            expander,
            clock,
            configs,
            page,
            fingerprint,
            resolved_ids: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Expand every enabled config's identity values. Called once; ids that
    /// expand to empty are dropped with a note.
    pub async fn init(&self, ctx: &ExpansionContext) {
        let mut resolved = HashMap::new();
        let id_ctx = ctx.clone().with_encode(false);
        for (name, config) in &self.configs {
            if !config.enabled {
                continue;
            }
            let mut ids = Vec::with_capacity(config.ids.len());
            for (key, template) in &config.ids {
                let value = self.expander.expand(template, &id_ctx).await;
                if value.is_empty() {
                    tracing::debug!(config = %name, key = %key, "linker id expanded empty, dropped");
                    continue;
                }
                ids.push((key.clone(), value));
            }
            resolved.insert(name.clone(), ids);
        }
        self.resolved_ids.store(Arc::new(resolved));
    }

    /// Decorate an outbound navigation target, attaching each eligible
    /// config's token at most once. Returns the (possibly unchanged) URL.
    pub fn handle_navigation(&self, destination_url: &str, event: NavigationEventType) -> String {
        tracing::trace!(destination_url, ?event, "linker navigation event");
        self.decorate_url(destination_url)
    }

    fn decorate_url(&self, destination_url: &str) -> String {
        let Ok(mut parsed) = Url::parse(destination_url) else {
            return destination_url.to_string();
        };
        let resolved = self.resolved_ids.load();
        let mut decorated = false;

        for (name, config) in &self.configs {
            if !config.enabled {
                continue;
            }
            if config.proxy_only && !self.page.served_from_proxy {
                continue;
            }
            // Idempotent per click: an already-decorated URL keeps its
            // existing parameter.
            if parsed.query_pairs().any(|(key, _)| key == name.as_str()) {
                continue;
            }
            if !is_eligible(parsed.as_str(), config, &self.page) {
                continue;
            }
            let Some(ids) = resolved.get(name) else {
                continue;
            };
            let token = codec::encode(
                LINKER_VERSION,
                ids,
                &self.fingerprint,
                self.clock.now_millis(),
            );
            if token.is_empty() {
                continue;
            }
            parsed.query_pairs_mut().append_pair(name, &token);
            metrics::record_linker_token_appended(name);
            decorated = true;
        }

        if decorated {
            parsed.into()
        } else {
            destination_url.to_string()
        }
    }
}
