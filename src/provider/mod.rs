//! Uniform façade over remote model APIs: the [`Provider`] trait, the
//! URL-scheme registry that resolves one by name, rate limiting, and retry.

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod rate_limit;
pub mod registry;
pub mod retry;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A remote model service, addressed by URL scheme (`openai://…`,
/// `anthropic://…`, `mock://…`). Implementors translate vendor-specific
/// failures into the `ErrorKind` taxonomy so callers can retry without
/// knowing which vendor they're talking to.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send `prompt`, return the raw response text.
    async fn analyze_with_context(&self, ctx: CancellationToken, prompt: &str) -> Result<String>;

    /// Liveness check.
    async fn health(&self, ctx: CancellationToken) -> Result<()>;

    /// Human-readable provider name, used in `CallMetrics` and cache records.
    fn name(&self) -> &str;
}

pub use rate_limit::RateLimiter;
pub use registry::{ProviderFactory, ProviderRegistry};
pub use retry::RetryController;
