//! Registry built from configuration: disabled entries are omitted, unknown
//! entries are ignored at build time, and written-once/read-only thereafter
//! once the engine has started.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::Connector;
use crate::error::{AnalysisError, Result};
use crate::model::EvidenceEvent;

/// A registered connector plus its runtime enable/disable state.
#[derive(Clone)]
struct RegisteredConnector {
    connector: Arc<dyn Connector>,
    enabled: bool,
}

/// Maps a source identifier (`github`, `jira`, …) to its collector.
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<String, RegisteredConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, connector: Arc<dyn Connector>) {
        let source = connector.source().to_string();
        tracing::info!(source = %source, "registering connector");
        self.connectors.write().insert(
            source,
            RegisteredConnector {
                connector,
                enabled: true,
            },
        );
    }

    /// Remove a connector entirely. Returns `false` if it wasn't registered.
    pub fn unregister(&self, source: &str) -> bool {
        self.connectors.write().remove(source).is_some()
    }

    /// Flip a registered connector's `enabled` flag to `true` without
    /// re-registering it. Returns `false` if it isn't registered.
    pub fn enable(&self, source: &str) -> bool {
        match self.connectors.write().get_mut(source) {
            Some(reg) => {
                reg.enabled = true;
                true
            }
            None => false,
        }
    }

    /// Flip a registered connector's `enabled` flag to `false`. The entry
    /// stays in the registry — `by_source`/`collect`/`health_all` treat it
    /// as absent until it's `enable`d again. Returns `false` if it isn't
    /// registered.
    pub fn disable(&self, source: &str) -> bool {
        match self.connectors.write().get_mut(source) {
            Some(reg) => {
                reg.enabled = false;
                true
            }
            None => false,
        }
    }

    pub fn by_source(&self, source: &str) -> Option<Arc<dyn Connector>> {
        self.connectors
            .read()
            .get(source)
            .filter(|reg| reg.enabled)
            .map(|reg| reg.connector.clone())
    }

    /// Sources with a registered, enabled connector.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self
            .connectors
            .read()
            .iter()
            .filter(|(_, reg)| reg.enabled)
            .map(|(source, _)| source.clone())
            .collect();
        sources.sort_unstable();
        sources
    }

    /// Dispatch `(source, query)` to the matching connector. The connector's
    /// error is surfaced verbatim to the caller (the executor).
    pub async fn collect(
        &self,
        ctx: CancellationToken,
        source: &str,
        query: &str,
    ) -> Result<Vec<EvidenceEvent>> {
        let connector = self.by_source(source).ok_or_else(|| {
            AnalysisError::invalid_request(format!("no connector registered for source {source:?}"))
        })?;
        connector.collect(ctx, query).await
    }

    pub async fn health_all(&self, ctx: CancellationToken) -> HashMap<String, Result<()>> {
        let snapshot: Vec<(String, Arc<dyn Connector>)> = self
            .connectors
            .read()
            .iter()
            .filter(|(_, reg)| reg.enabled)
            .map(|(k, reg)| (k.clone(), reg.connector.clone()))
            .collect();

        let mut results = HashMap::new();
        for (source, connector) in snapshot {
            results.insert(source, connector.health(ctx.clone()).await);
        }
        results
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::mock::MockConnector;

    #[tokio::test]
    async fn collect_dispatches_to_registered_connector() {
        let registry = ConnectorRegistry::new();
        registry.register(Arc::new(MockConnector::new("github")));
        let events = registry
            .collect(CancellationToken::new(), "github", "auth commits")
            .await
            .unwrap();
        assert!(!events.is_empty());
    }

    #[tokio::test]
    async fn unknown_source_is_an_error() {
        let registry = ConnectorRegistry::new();
        let err = registry
            .collect(CancellationToken::new(), "jira", "q")
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidRequest);
    }

    #[test]
    fn disable_hides_without_removing() {
        let registry = ConnectorRegistry::new();
        registry.register(Arc::new(MockConnector::new("github")));
        assert!(registry.disable("github"));
        assert!(registry.by_source("github").is_none());
        assert!(!registry.sources().contains(&"github".to_string()));
    }

    #[test]
    fn enable_restores_a_disabled_connector() {
        let registry = ConnectorRegistry::new();
        registry.register(Arc::new(MockConnector::new("github")));
        registry.disable("github");
        assert!(registry.enable("github"));
        assert!(registry.by_source("github").is_some());
        assert!(registry.sources().contains(&"github".to_string()));
    }

    #[test]
    fn enable_and_disable_are_false_for_unknown_source() {
        let registry = ConnectorRegistry::new();
        assert!(!registry.enable("github"));
        assert!(!registry.disable("github"));
    }

    #[test]
    fn unregister_removes_the_connector_entirely() {
        let registry = ConnectorRegistry::new();
        registry.register(Arc::new(MockConnector::new("github")));
        assert!(registry.unregister("github"));
        assert!(!registry.unregister("github"));
        assert!(registry.by_source("github").is_none());
    }

    #[tokio::test]
    async fn health_all_skips_disabled_connectors() {
        let registry = ConnectorRegistry::new();
        registry.register(Arc::new(MockConnector::new("github")));
        registry.register(Arc::new(MockConnector::new("jira")));
        registry.disable("jira");

        let results = registry.health_all(CancellationToken::new()).await;
        assert!(results.contains_key("github"));
        assert!(!results.contains_key("jira"));
    }
}
