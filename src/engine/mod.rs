//! The three user-facing operations (`Analyze`, `ProposePlan`,
//! `ExecutePlan`) wired together against the shared machinery: provider,
//! rate limiter, retry controller, cache, auto-approve matcher and
//! connector registry.

mod analyze;
mod execute;
mod plan;

use std::sync::Arc;
use std::time::Duration;

use crate::approve::AutoApproveMatcher;
use crate::cache::ResponseCache;
use crate::config::AiConfig;
use crate::connector::ConnectorRegistry;
use crate::error::Result;
use crate::provider::{Provider, RateLimiter, RetryController};
use crate::redact::Redactor;

/// Orchestrates analysis, planning and plan execution against a single
/// configured provider.
pub struct Engine {
    provider: Arc<dyn Provider>,
    rate_limiter: RateLimiter,
    retry: RetryController,
    cache: Option<ResponseCache>,
    matcher: AutoApproveMatcher,
    connectors: Arc<ConnectorRegistry>,
    redactor: Redactor,
    config: AiConfig,
}

impl Engine {
    /// Assemble an engine from config plus the already-resolved provider and
    /// connector registry (resolving `config.ai.provider` against a
    /// [`crate::provider::ProviderRegistry`] is the caller's job, since the
    /// registry is process-global and callers may want a test-local one).
    pub fn new(
        config: AiConfig,
        provider: Arc<dyn Provider>,
        connectors: Arc<ConnectorRegistry>,
    ) -> Result<Self> {
        let cache = if config.no_cache {
            None
        } else {
            Some(ResponseCache::new(&config.cache_dir)?)
        };

        Ok(Self {
            provider,
            rate_limiter: RateLimiter::new(config.rate_limit_rpm),
            retry: RetryController::new(Duration::from_secs(config.timeout_secs)),
            cache,
            matcher: AutoApproveMatcher::new(&config.autonomous)?,
            connectors,
            redactor: Redactor::new(&config.redaction)?,
            config,
        })
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }
}
