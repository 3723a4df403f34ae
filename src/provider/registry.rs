//! Process-global URL-scheme registry mapping `scheme://host` to a provider
//! factory. Registration happens once at startup; reads after warm-up never
//! block on registration (a `parking_lot::RwLock` favors the read path and
//! registration is a rare, one-shot event per scheme).

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::Provider;
use crate::error::{AnalysisError, Result};

/// Builds a [`Provider`] from the `host` portion of a `scheme://host` URL.
pub type ProviderFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn Provider>> + Send + Sync>;

/// A registry of provider factories keyed by URL scheme.
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory for `scheme`. Duplicate registration of the same
    /// scheme is a programmer error, not a runtime condition to recover
    /// from, and returns an error rather than silently overwriting.
    pub fn register(&self, scheme: impl Into<String>, factory: ProviderFactory) -> Result<()> {
        let scheme = scheme.into();
        let mut guard = self.factories.write();
        if guard.contains_key(&scheme) {
            return Err(AnalysisError::invalid_request(format!(
                "provider scheme {scheme:?} is already registered"
            )));
        }
        tracing::info!(scheme = %scheme, "registering provider scheme");
        guard.insert(scheme, factory);
        Ok(())
    }

    /// Resolve a `scheme://host` URL to a provider instance.
    pub fn resolve(&self, url: &str) -> Result<Arc<dyn Provider>> {
        let (scheme, host) = split_scheme(url).ok_or_else(|| {
            AnalysisError::invalid_request(format!("provider url {url:?} has no scheme"))
        })?;

        let guard = self.factories.read();
        match guard.get(scheme) {
            Some(factory) => factory(host),
            None => {
                let mut known: Vec<&str> = guard.keys().map(String::as_str).collect();
                known.sort_unstable();
                Err(AnalysisError::invalid_request(format!(
                    "unknown provider scheme {scheme:?}; registered schemes: {known:?}"
                )))
            }
        }
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.factories.read().keys().cloned().collect();
        schemes.sort_unstable();
        schemes
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn split_scheme(url: &str) -> Option<(&str, &str)> {
    url.split_once("://")
}

/// The process-global registry, pre-populated with the built-in adapters.
/// Unit tests that need isolation should construct their own
/// [`ProviderRegistry`] instead of relying on this singleton.
static GLOBAL: Lazy<ProviderRegistry> = Lazy::new(|| {
    let registry = ProviderRegistry::new();
    super::openai::register(&registry).expect("openai factory registers once");
    super::anthropic::register(&registry).expect("anthropic factory registers once");
    super::mock::register(&registry).expect("mock factory registers once");
    registry
});

/// Access the process-global provider registry.
pub fn global() -> &'static ProviderRegistry {
    &GLOBAL
}
