//! `mock://` provider: deterministic canned responses, call counting, and
//! injectable failure sequences — test-only, but registered through the
//! same scheme registry as the real adapters so the rate-limit/retry stack
//! can be exercised end-to-end without a network.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::registry::{ProviderFactory, ProviderRegistry};
use super::Provider;
use crate::error::{AnalysisError, ErrorKind, Result};

/// A scripted outcome for one `analyze_with_context` call.
#[derive(Clone)]
pub enum Scripted {
    Ok(String),
    Err(ErrorKind, String),
}

/// A provider whose responses are scripted up front, for deterministic
/// tests of the retry controller, the analysis engine and the planner.
pub struct MockProvider {
    name: String,
    script: Mutex<Vec<Scripted>>,
    default_response: String,
    call_count: AtomicU32,
    last_prompt: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(Vec::new()),
            default_response: "{}".to_string(),
            call_count: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Queue outcomes to be returned in order, one per call. Once exhausted,
    /// calls fall back to the default response.
    pub fn with_script(self, script: Vec<Scripted>) -> Self {
        *self.script.lock() = script;
        self
    }

    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn analyze_with_context(&self, _ctx: CancellationToken, prompt: &str) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());

        let next = {
            let mut script = self.script.lock();
            if script.is_empty() {
                None
            } else {
                Some(script.remove(0))
            }
        };

        match next {
            Some(Scripted::Ok(text)) => Ok(text),
            Some(Scripted::Err(kind, message)) => Err(AnalysisError::new(kind, message)),
            None => Ok(self.default_response.clone()),
        }
    }

    async fn health(&self, _ctx: CancellationToken) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn register(registry: &ProviderRegistry) -> Result<()> {
    let factory: ProviderFactory =
        Arc::new(|host: &str| Ok(Arc::new(MockProvider::new(host)) as Arc<dyn Provider>));
    registry.register("mock", factory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_is_consumed_in_order() {
        let provider = MockProvider::new("test").with_script(vec![
            Scripted::Err(ErrorKind::Timeout, "slow".into()),
            Scripted::Ok("done".into()),
        ]);
        let ctx = CancellationToken::new();
        assert!(provider.analyze_with_context(ctx.clone(), "p").await.is_err());
        assert_eq!(
            provider.analyze_with_context(ctx, "p").await.unwrap(),
            "done"
        );
        assert_eq!(provider.call_count(), 2);
    }
}
