//! Macro registry and resolution.
//!
//! Macros are named functions invoked via `${NAME(args)}` syntax that
//! resolve to a platform-provided or computed string. The registry is built
//! once at startup through [`MacroRegistryBuilder`] and immutable afterward,
//! keeping dispatch auditable. Platform values (cookies, consent,
//! identifiers, performance metrics) come from host-registered macros; this
//! module only ships a small computed set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;

use crate::error::{ConfigError, ExpansionError};

/// A macro handler: positional string arguments in, deferred string out.
pub type MacroFn =
    Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, Result<String, ExpansionError>> + Send + Sync>;

/// External macro-resolution capability injected into the expander.
///
/// `Ok(None)` means "not a macro I know" and leaves the token untouched,
/// so unrecognized tokens survive for a later platform pass.
#[async_trait]
pub trait MacroResolver: Send + Sync {
    async fn resolve(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<Option<String>, ExpansionError>;
}

/// Immutable name → handler table.
pub struct MacroRegistry {
    entries: HashMap<String, MacroFn>,
}

#[async_trait]
impl MacroResolver for MacroRegistry {
    async fn resolve(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<Option<String>, ExpansionError> {
        match self.entries.get(name) {
            Some(handler) => handler(args.to_vec()).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Builder for [`MacroRegistry`]. Registration happens once at startup;
/// duplicate names are a fatal configuration error.
#[derive(Default)]
pub struct MacroRegistryBuilder {
    entries: HashMap<String, MacroFn>,
}

impl std::fmt::Debug for MacroRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroRegistryBuilder")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MacroRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async macro handler. Names are case-sensitive and may
    /// begin with `$`.
    pub fn register<F>(mut self, name: &str, handler: F) -> Result<Self, ConfigError>
    where
        F: Fn(Vec<String>) -> BoxFuture<'static, Result<String, ExpansionError>>
            + Send
            + Sync
            + 'static,
    {
        if self.entries.contains_key(name) {
            return Err(ConfigError::DuplicateMacro(name.to_string()));
        }
        self.entries.insert(name.to_string(), Arc::new(handler));
        Ok(self)
    }

    /// Register a synchronous macro handler.
    pub fn register_sync<F>(self, name: &str, handler: F) -> Result<Self, ConfigError>
    where
        F: Fn(Vec<String>) -> String + Send + Sync + 'static,
    {
        self.register(name, move |args| {
            let value = handler(args);
            Box::pin(async move { Ok(value) })
        })
    }

    /// Register the built-in computed macros: `TIMESTAMP`, `RANDOM`,
    /// `COUNTER(scope)` and `DEFAULT(value, fallback)`.
    pub fn with_builtins(self) -> Result<Self, ConfigError> {
        let counters: Arc<Mutex<HashMap<String, u64>>> = Arc::new(Mutex::new(HashMap::new()));

        self.register_sync("TIMESTAMP", |_args| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
                .to_string()
        })?
        .register_sync("RANDOM", |_args| {
            rand::thread_rng().gen::<f64>().to_string()
        })?
        .register_sync("COUNTER", move |args| {
            let scope = args.first().cloned().unwrap_or_default();
            let mut counters = counters.lock().expect("counter mutex poisoned");
            let count = counters.entry(scope).or_insert(0);
            *count += 1;
            count.to_string()
        })?
        .register_sync("DEFAULT", |args| {
            args.into_iter().find(|a| !a.is_empty()).unwrap_or_default()
        })
    }

    pub fn build(self) -> MacroRegistry {
        MacroRegistry {
            entries: self.entries,
        }
    }
}
