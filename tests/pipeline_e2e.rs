//! End-to-end integration tests for the analysis orchestration engine.
//!
//! These exercise `ProposePlan` -> approve -> `ExecutePlan` -> `Analyze`
//! wired together through the public `Engine` API, against mock providers
//! and connectors (no network).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use evidentia_core::cache::ResponseCache;
use evidentia_core::config::{AiConfig, AutonomousConfig, BudgetConfig, ConcurrencyConfig};
use evidentia_core::connector::mock::MockConnector;
use evidentia_core::connector::ConnectorRegistry;
use evidentia_core::model::{ContextPreamble, EvidenceBundle, EvidenceEvent, Rubrics};
use evidentia_core::provider::mock::MockProvider;
use evidentia_core::Engine;

fn preamble() -> ContextPreamble {
    ContextPreamble::new(
        "SOC2",
        "2017",
        "CC6.1",
        "Logical access controls restrict access to information assets based on need to know.",
        vec!["AC-1".into()],
        Rubrics::default(),
    )
    .unwrap()
}

fn plan_response() -> String {
    serde_json::json!([
        {"source": "github", "query": "authentication", "signal_strength": 0.9, "rationale": "recent auth commits"},
        {"source": "jira", "query": "mfa rollout", "signal_strength": 0.6, "rationale": "tracked MFA tickets"},
    ])
    .to_string()
}

fn analysis_response() -> String {
    serde_json::json!({
        "title": "MFA enforced on admin accounts",
        "summary": "Commits and tickets show MFA rollout for admin access",
        "justification": "Evidence across two sources corroborates the control",
        "confidence_score": 0.82,
        "residual_risk": "low",
        "mapped_controls": ["AC-2"],
        "citations": ["placeholder"],
        "severity": "low",
    })
    .to_string()
}

/// Full autonomous-mode run: plan two sources, auto-approve one, manually
/// approve the rest, execute, then analyze the collected bundle.
#[tokio::test]
async fn autonomous_mode_plans_collects_and_analyzes() {
    let cache_dir = tempfile::tempdir().unwrap();
    let mut auto_approve = std::collections::HashMap::new();
    auto_approve.insert("github".to_string(), vec!["auth*".to_string()]);

    let config = AiConfig {
        cache_dir: cache_dir.path().to_path_buf(),
        no_cache: true,
        autonomous: AutonomousConfig {
            enabled: true,
            auto_approve,
        },
        budgets: BudgetConfig {
            max_sources: 5,
            max_api_calls: 20,
            max_tokens: 20_000,
        },
        concurrency: ConcurrencyConfig { max_collections: 4 },
        ..AiConfig::default()
    };

    let provider = MockProvider::new("mock").with_script(vec![
        evidentia_core::provider::mock::Scripted::Ok(plan_response()),
    ]);

    let connectors = ConnectorRegistry::new();
    connectors.register(Arc::new(MockConnector::new("github").with_events(vec![
        EvidenceEvent {
            id: "c1".into(),
            source: "github".into(),
            event_type: "commit".into(),
            timestamp: chrono::Utc::now(),
            content: "Enforced MFA on all admin accounts".into(),
            metadata: Default::default(),
        },
    ])));
    connectors.register(Arc::new(MockConnector::new("jira").with_events(vec![
        EvidenceEvent {
            id: "t1".into(),
            source: "jira".into(),
            event_type: "ticket".into(),
            timestamp: chrono::Utc::now(),
            content: "SEC-42: roll out MFA to admin group".into(),
            metadata: Default::default(),
        },
    ])));

    let engine = Engine::new(config, Arc::new(provider), Arc::new(connectors)).unwrap();

    let mut plan = engine
        .propose_plan(CancellationToken::new(), &preamble())
        .await
        .unwrap();

    // github/authentication matched the auto-approve glob; jira did not.
    assert!(plan.items.iter().any(|i| i.source == "github" && i.auto_approved));
    assert!(plan.items.iter().any(|i| i.source == "jira" && !i.auto_approved));

    plan.approve_all_pending();

    let collected = engine
        .execute_plan(CancellationToken::new(), &mut plan)
        .await
        .unwrap();
    assert_eq!(collected.events.len(), 2);
    assert!(plan.items.iter().all(|i| i.execution_status == evidentia_core::model::ExecutionStatus::Complete));

    // Swap in a second provider for the analysis call (scripted independently).
    let analysis_provider =
        MockProvider::new("mock").with_default_response(analysis_response());
    let cache_dir2 = tempfile::tempdir().unwrap();
    let analysis_engine = Engine::new(
        AiConfig {
            cache_dir: cache_dir2.path().to_path_buf(),
            no_cache: true,
            ..AiConfig::default()
        },
        Arc::new(analysis_provider),
        Arc::new(ConnectorRegistry::new()),
    )
    .unwrap();

    let finding = analysis_engine
        .analyze(CancellationToken::new(), &preamble(), &collected)
        .await
        .unwrap();

    // The scripted citation id isn't in the bundle, so it's dropped and the
    // finding ends up with none — this asserts the citation-filtering
    // invariant rather than a specific id.
    assert!(finding.citations.is_empty());
    assert!(!finding.review_required);
}

/// A cache-miss analysis followed by a byte-equal second call must be a
/// cache hit: same finding fields, and the on-disk record survives a fresh
/// `ResponseCache::new` over the same directory.
#[tokio::test]
async fn cache_persists_across_engine_instances() {
    let cache_dir = tempfile::tempdir().unwrap();
    let bundle = EvidenceBundle::new(vec![EvidenceEvent {
        id: "e1".into(),
        source: "github".into(),
        event_type: "commit".into(),
        timestamp: chrono::Utc::now(),
        content: "Enforced MFA on all admin accounts".into(),
        metadata: Default::default(),
    }]);

    {
        let provider = MockProvider::new("mock").with_default_response(analysis_response());
        let engine = Engine::new(
            AiConfig {
                cache_dir: cache_dir.path().to_path_buf(),
                ..AiConfig::default()
            },
            Arc::new(provider),
            Arc::new(ConnectorRegistry::new()),
        )
        .unwrap();
        engine
            .analyze(CancellationToken::new(), &preamble(), &bundle)
            .await
            .unwrap();
    }

    // Reopening the cache directory directly must show the persisted record
    // without going through the engine at all.
    let reloaded = ResponseCache::new(cache_dir.path()).unwrap();
    assert_eq!(reloaded.stats().entry_count, 1);
}

/// A plan that exceeds the configured source budget is rejected before any
/// collection happens.
#[tokio::test]
async fn plan_budget_rejects_before_any_collection() {
    let cache_dir = tempfile::tempdir().unwrap();
    let response = serde_json::json!([
        {"source": "github", "query": "a", "signal_strength": 0.5, "rationale": "r"},
        {"source": "jira", "query": "b", "signal_strength": 0.5, "rationale": "r"},
    ])
    .to_string();

    let provider = MockProvider::new("mock").with_default_response(response);
    let engine = Engine::new(
        AiConfig {
            cache_dir: cache_dir.path().to_path_buf(),
            no_cache: true,
            budgets: BudgetConfig {
                max_sources: 1,
                max_api_calls: 50,
                max_tokens: 50_000,
            },
            ..AiConfig::default()
        },
        Arc::new(provider),
        Arc::new(ConnectorRegistry::new()),
    )
    .unwrap();

    let err = engine
        .propose_plan(CancellationToken::new(), &preamble())
        .await
        .unwrap_err();
    assert_eq!(err.kind, evidentia_core::error::ErrorKind::BudgetExceeded);
}
