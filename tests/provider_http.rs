//! HTTP-level tests for the `openai://` provider adapter against a mocked
//! server, exercising the real request/response wire format instead of the
//! in-process `mock://` provider.

use evidentia_core::error::ErrorKind;
use evidentia_core::provider::registry::ProviderRegistry;
use evidentia_core::provider::Provider;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn successful_completion_returns_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "{\"ok\": true}"}}]
        })))
        .mount(&server)
        .await;

    let registry = ProviderRegistry::new();
    evidentia_core::provider::openai::register(&registry).unwrap();
    let provider = registry.resolve(&format!("openai://{}", server.uri())).unwrap();

    let text = provider
        .analyze_with_context(CancellationToken::new(), "hello")
        .await
        .unwrap();
    assert_eq!(text, "{\"ok\": true}");
}

#[tokio::test]
async fn rate_limited_status_classifies_as_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let registry = ProviderRegistry::new();
    evidentia_core::provider::openai::register(&registry).unwrap();
    let provider = registry.resolve(&format!("openai://{}", server.uri())).unwrap();

    let err = provider
        .analyze_with_context(CancellationToken::new(), "hello")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn auth_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let registry = ProviderRegistry::new();
    evidentia_core::provider::openai::register(&registry).unwrap();
    let provider = registry.resolve(&format!("openai://{}", server.uri())).unwrap();

    let err = provider
        .analyze_with_context(CancellationToken::new(), "hello")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Auth);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn health_check_reports_server_errors_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let registry = ProviderRegistry::new();
    evidentia_core::provider::openai::register(&registry).unwrap();
    let provider = registry.resolve(&format!("openai://{}", server.uri())).unwrap();

    let err = provider.health(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);
}
