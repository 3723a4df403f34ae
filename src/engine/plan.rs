//! `ProposePlan`: builds a deterministic, budget-respecting evidence plan
//! from a preamble. Plans are never cached — they must be fresh.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::Utc;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Engine;
use crate::error::{AnalysisError, Result};
use crate::metrics::CallMetrics;
use crate::model::{ApprovalStatus, ContextPreamble, EvidencePlan, PlanItem, PlanStatus};

/// Fixed overhead (in estimated tokens) charged once per plan for the
/// preamble itself, independent of item count.
const PLANNING_PROMPT_OVERHEAD: u32 = 200;
/// Fixed per-item overhead (in estimated tokens) beyond the query/rationale
/// text, covering the JSON scaffolding around each item.
const ITEM_BASE_OVERHEAD: u32 = 20;
/// Heuristic characters-per-token ratio used throughout the estimator.
const CHARS_PER_TOKEN: usize = 4;

/// Per-source override for the number of provider calls a single plan item
/// is expected to cost (e.g. a paginated source). Empty by default —
/// extend as specific sources are known to require pagination.
fn calls_override(_source: &str) -> Option<u32> {
    None
}

#[derive(Debug, Deserialize)]
struct RawPlanItem {
    source: String,
    query: String,
    signal_strength: f64,
    rationale: String,
}

impl Engine {
    pub async fn propose_plan(
        &self,
        ctx: CancellationToken,
        preamble: &ContextPreamble,
    ) -> Result<EvidencePlan> {
        let started = Instant::now();
        preamble.validate()?;

        let prompt = build_planning_prompt(preamble);

        let provider = self.provider.clone();
        let rate_limiter = &self.rate_limiter;
        let retry = &self.retry;
        let prompt_for_call = prompt.clone();

        let response = retry
            .execute(ctx.clone(), || {
                let provider = provider.clone();
                let prompt = prompt_for_call.clone();
                let ctx = ctx.clone();
                async move {
                    rate_limiter.wait(ctx.clone()).await?;
                    provider.analyze_with_context(ctx, &prompt).await
                }
            })
            .await?;

        let raw_items: Vec<RawPlanItem> = serde_json::from_str(&response)
            .map_err(|e| AnalysisError::invalid_json(format!("plan response: {e}")))?;

        if raw_items.is_empty() {
            return Err(AnalysisError::no_plan_items());
        }

        let mut items: Vec<PlanItem> = raw_items
            .into_iter()
            .map(|raw| {
                PlanItem::new(raw.source, raw.query, raw.signal_strength, raw.rationale)
            })
            .collect();

        // Determinism: sort (source ASC, query ASC).
        items.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.query.cmp(&b.query)));

        for item in &mut items {
            if self.matcher.matches(&item.source, &item.query) {
                item.auto_approved = true;
                item.approval_status = ApprovalStatus::AutoApproved;
            } else {
                item.approval_status = ApprovalStatus::Pending;
            }
        }

        let distinct_sources: HashSet<&str> = items.iter().map(|i| i.source.as_str()).collect();
        let estimated_sources = distinct_sources.len();

        let mut estimated_calls: u32 = 0;
        let mut estimated_tokens: u32 = PLANNING_PROMPT_OVERHEAD;
        let mut calls_by_source: HashMap<String, u32> = HashMap::new();
        for item in &items {
            let calls = calls_override(&item.source).unwrap_or(1);
            *calls_by_source.entry(item.source.clone()).or_insert(0) += calls;
            estimated_calls += calls;
            estimated_tokens += ITEM_BASE_OVERHEAD
                + (item.query.chars().count().div_ceil(CHARS_PER_TOKEN)) as u32
                + (item.rationale.chars().count().div_ceil(CHARS_PER_TOKEN)) as u32;
        }

        let budgets = &self.config.budgets;
        if estimated_sources > budgets.max_sources
            || estimated_calls > budgets.max_api_calls
            || estimated_tokens > budgets.max_tokens
        {
            return Err(AnalysisError::budget_exceeded(format!(
                "plan exceeds budget: sources={estimated_sources}/{}, calls={estimated_calls}/{}, tokens={estimated_tokens}/{}",
                budgets.max_sources, budgets.max_api_calls, budgets.max_tokens
            )));
        }

        emit_metrics(CallMetrics {
            provider: self.provider.name().to_string(),
            tokens_used: estimate_tokens(&prompt) + estimate_tokens(&response),
            latency_ms: started.elapsed().as_millis() as u64,
            cache_hit: false,
            redaction_count: 0,
        });

        Ok(EvidencePlan {
            id: Uuid::new_v4().to_string(),
            framework: preamble.framework.clone(),
            section: preamble.section.clone(),
            status: PlanStatus::Pending,
            items,
            estimated_sources,
            estimated_calls,
            estimated_tokens,
            created_at: Utc::now(),
        })
    }
}

fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(CHARS_PER_TOKEN as u32)
}

fn emit_metrics(metrics: CallMetrics) {
    tracing::info!(
        provider = %metrics.provider,
        tokens_used = metrics.tokens_used,
        latency_ms = metrics.latency_ms,
        cache_hit = metrics.cache_hit,
        redaction_count = metrics.redaction_count,
        "propose_plan call completed"
    );
}

fn build_planning_prompt(preamble: &ContextPreamble) -> String {
    format!(
        "SYSTEM: You are a compliance evidence planner. Respond with a JSON array of \
         {{source, query, signal_strength, rationale}} objects describing probes likely \
         to surface supporting evidence.\n\nUSER:\nFramework: {}\nSection: {}\nExcerpt: {}\n\
         Control IDs: {}\n",
        preamble.framework,
        preamble.section,
        preamble.excerpt,
        preamble.control_ids.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AiConfig, AutonomousConfig, BudgetConfig};
    use crate::connector::ConnectorRegistry;
    use crate::model::Rubrics;
    use crate::provider::mock::MockProvider;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc;

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

    fn engine_with_response(response: &str, cache_dir: &std::path::Path) -> Engine {
        let mut auto_approve = StdHashMap::new();
        auto_approve.insert("github".to_string(), vec!["auth*".to_string()]);
        auto_approve.insert("aws".to_string(), vec!["iam:*".to_string()]);

        let config = AiConfig {
            cache_dir: cache_dir.to_path_buf(),
            no_cache: true,
            autonomous: AutonomousConfig {
                enabled: true,
                auto_approve,
            },
            budgets: BudgetConfig {
                max_sources: 10,
                max_api_calls: 50,
                max_tokens: 50_000,
            },
            ..AiConfig::default()
        };
        let provider = MockProvider::new("mock").with_default_response(response);
        Engine::new(config, Arc::new(provider), Arc::new(ConnectorRegistry::new())).unwrap()
    }

    #[tokio::test]
    async fn plan_is_sorted_and_auto_approved_deterministically() {
        let response = serde_json::json!([
            {"source": "github", "query": "payment", "signal_strength": 0.5, "rationale": "r1"},
            {"source": "github", "query": "authentication", "signal_strength": 0.8, "rationale": "r2"},
            {"source": "aws", "query": "iam:CreateUser", "signal_strength": 0.9, "rationale": "r3"},
        ])
        .to_string();
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with_response(&response, tmp.path());

        let plan = engine
            .propose_plan(CancellationToken::new(), &preamble())
            .await
            .unwrap();

        let pairs: Vec<(&str, &str)> = plan
            .items
            .iter()
            .map(|i| (i.source.as_str(), i.query.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("aws", "iam:CreateUser"),
                ("github", "authentication"),
                ("github", "payment"),
            ]
        );
        assert!(plan.items[0].auto_approved);
        assert!(plan.items[1].auto_approved);
        assert!(!plan.items[2].auto_approved);
    }

    #[tokio::test]
    async fn empty_plan_items_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with_response("[]", tmp.path());
        let err = engine
            .propose_plan(CancellationToken::new(), &preamble())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NoPlanItems);
    }

    #[tokio::test]
    async fn budget_ceiling_is_enforced() {
        let response = serde_json::json!([
            {"source": "github", "query": "a", "signal_strength": 0.5, "rationale": "r"},
            {"source": "jira", "query": "b", "signal_strength": 0.5, "rationale": "r"},
            {"source": "aws", "query": "c", "signal_strength": 0.5, "rationale": "r"},
        ])
        .to_string();
        let tmp = tempfile::tempdir().unwrap();
        let tight = AiConfig {
            cache_dir: tmp.path().to_path_buf(),
            no_cache: true,
            budgets: BudgetConfig {
                max_sources: 1,
                max_api_calls: 50,
                max_tokens: 50_000,
            },
            ..AiConfig::default()
        };
        let provider = MockProvider::new("mock").with_default_response(response);
        let engine =
            Engine::new(tight, Arc::new(provider), Arc::new(ConnectorRegistry::new())).unwrap();
        let err = engine
            .propose_plan(CancellationToken::new(), &preamble())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::BudgetExceeded);
    }
}
