//! `anthropic://` provider: posts a messages-shaped body to
//! `{host}/v1/messages` with the `x-api-key`/`anthropic-version` headers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::registry::{ProviderFactory, ProviderRegistry};
use super::Provider;
use crate::error::{AnalysisError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(host: &str) -> Self {
        let base_url = normalize_host(host);
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client builds"),
            base_url,
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: "claude-sonnet".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn analyze_with_context(&self, _ctx: CancellationToken, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": 4096,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        let bytes = response.text().await.map_err(|e| {
            AnalysisError::unavailable(format!("reading anthropic response body: {e}"))
        })?;

        classify_status(status, &bytes)?;

        let parsed: serde_json::Value = serde_json::from_str(&bytes).map_err(|e| {
            AnalysisError::invalid_json(format!("anthropic response not JSON: {e}"))
        })?;

        parsed
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::invalid_json("anthropic response missing content[0].text"))
    }

    async fn health(&self, _ctx: CancellationToken) -> Result<()> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        classify_status(response.status(), "")
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn classify_transport_error(err: &reqwest::Error) -> AnalysisError {
    if err.is_timeout() {
        AnalysisError::timeout(err.to_string())
    } else {
        AnalysisError::unavailable(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AnalysisError::auth(format!(
            "anthropic auth error: {status}"
        ))),
        StatusCode::TOO_MANY_REQUESTS => Err(AnalysisError::rate_limit(format!(
            "anthropic rate limited: {status}"
        ))),
        StatusCode::PAYMENT_REQUIRED => Err(AnalysisError::quota(format!(
            "anthropic quota exceeded: {status}"
        ))),
        StatusCode::REQUEST_TIMEOUT => {
            Err(AnalysisError::timeout(format!("anthropic timeout: {status}")))
        }
        s if s.is_server_error() => Err(AnalysisError::unavailable(format!(
            "anthropic server error: {status} {body}"
        ))),
        s if s.is_client_error() => Err(AnalysisError::invalid_request(format!(
            "anthropic request error: {status} {body}"
        ))),
        _ => Err(AnalysisError::unavailable(format!(
            "anthropic unexpected status: {status}"
        ))),
    }
}

pub fn register(registry: &ProviderRegistry) -> Result<()> {
    let factory: ProviderFactory =
        Arc::new(|host: &str| Ok(Arc::new(AnthropicProvider::new(host)) as Arc<dyn Provider>));
    registry.register("anthropic", factory)
}
