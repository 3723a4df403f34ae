//! Dispatches a plan item `(source, query)` to the correct external
//! collector. The registry defines the trait real connectors (GitHub, Jira,
//! cloud APIs) implement out-of-process; this crate ships only the trait,
//! the registry, and a [`mock::MockConnector`] for tests.

pub mod mock;
pub mod registry;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::EvidenceEvent;

/// An external evidence source, addressed by its registry name (`github`,
/// `jira`, …). Free to interpret `query` however it likes.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn collect(&self, ctx: CancellationToken, query: &str) -> Result<Vec<EvidenceEvent>>;

    async fn health(&self, ctx: CancellationToken) -> Result<()>;

    fn source(&self) -> &str;
}

pub use registry::ConnectorRegistry;
