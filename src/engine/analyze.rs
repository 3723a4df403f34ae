//! `Analyze`: the context-mode pipeline — validate, redact, cache-lookup,
//! prompt, parse, score, cache-store.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Engine;
use crate::cache::ResponseCache;
use crate::error::{AnalysisError, Result};
use crate::metrics::CallMetrics;
use crate::model::{
    CachedResult, ContextPreamble, EvidenceBundle, EvidenceEvent, Finding, Provenance,
};
use crate::redact::Redactor;

/// Shape of the JSON the provider is expected to return.
#[derive(Debug, Deserialize)]
struct RawFinding {
    title: String,
    summary: String,
    justification: String,
    confidence_score: f64,
    residual_risk: String,
    #[serde(default)]
    mapped_controls: Vec<String>,
    #[serde(default)]
    citations: Vec<String>,
    severity: String,
}

impl Engine {
    /// Analyze `bundle` against `preamble`, returning a scored, citation-backed
    /// [`Finding`].
    pub async fn analyze(
        &self,
        ctx: CancellationToken,
        preamble: &ContextPreamble,
        bundle: &EvidenceBundle,
    ) -> Result<Finding> {
        let started = Instant::now();
        preamble.validate()?;

        let (redacted_bundle, redaction_count) = redact_bundle(&self.redactor, bundle)?;

        let control_id = preamble.control_ids.first().cloned().unwrap_or_default();
        let cache_key = ResponseCache::generate_key(
            &control_id,
            &preamble.framework,
            &preamble.excerpt,
            &redacted_bundle.events,
        );

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key) {
                tracing::info!(cache_key = %cache_key, "analysis cache hit");
                emit_metrics(CallMetrics {
                    provider: cached.provider.clone(),
                    tokens_used: 0,
                    latency_ms: started.elapsed().as_millis() as u64,
                    cache_hit: true,
                    redaction_count,
                });
                let mut finding = cached.response;
                finding.mode = "ai".to_string();
                return Ok(finding);
            }
        }

        let prompt = build_prompt(preamble, &redacted_bundle);

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

        let raw: RawFinding = serde_json::from_str(&response)
            .map_err(|e| AnalysisError::invalid_json(format!("analysis response: {e}")))?;

        if !(0.0..=1.0).contains(&raw.confidence_score) {
            return Err(AnalysisError::invalid_json(
                "confidence_score out of [0,1] range",
            ));
        }
        if !preamble.rubrics.risk_levels.iter().any(|l| l == &raw.severity) {
            return Err(AnalysisError::invalid_json(format!(
                "severity {:?} is not one of the rubric's risk levels {:?}",
                raw.severity, preamble.rubrics.risk_levels
            )));
        }
        if !raw.residual_risk.is_empty()
            && !preamble.rubrics.risk_levels.iter().any(|l| l == &raw.residual_risk)
        {
            return Err(AnalysisError::invalid_json(format!(
                "residual_risk {:?} is not one of the rubric's risk levels {:?}",
                raw.residual_risk, preamble.rubrics.risk_levels
            )));
        }

        let valid_ids: std::collections::HashSet<&str> =
            redacted_bundle.events.iter().map(|e| e.id.as_str()).collect();
        let (citations, dropped): (Vec<String>, usize) = {
            let mut kept = Vec::new();
            let mut dropped = 0usize;
            for id in raw.citations {
                if valid_ids.contains(id.as_str()) {
                    kept.push(id);
                } else {
                    dropped += 1;
                }
            }
            (kept, dropped)
        };
        if dropped > 0 {
            tracing::warn!(dropped, "dropped citations not present in input bundle");
        }

        let provenance = build_provenance(&citations, &redacted_bundle);
        let now = Utc::now();
        let review_required = raw.confidence_score < preamble.rubrics.confidence_threshold;

        let finding = Finding {
            id: Uuid::new_v4().to_string(),
            control_id,
            framework_id: preamble.framework.clone(),
            title: raw.title,
            summary: raw.summary,
            justification: raw.justification,
            severity: raw.severity,
            confidence_score: raw.confidence_score,
            residual_risk: raw.residual_risk,
            mapped_controls: raw.mapped_controls,
            citations,
            review_required,
            mode: "ai".to_string(),
            provenance,
            created_at: now,
            updated_at: now,
        };

        if let Some(cache) = &self.cache {
            let record = CachedResult {
                cache_key: cache_key.clone(),
                response: finding.clone(),
                cached_at: now,
                event_ids: redacted_bundle.events.iter().map(|e| e.id.clone()).collect(),
                control_id: finding.control_id.clone(),
                provider: self.provider.name().to_string(),
                model_version: self.config.model.clone(),
            };
            cache.set(&cache_key, record)?;
        }

        emit_metrics(CallMetrics {
            provider: self.provider.name().to_string(),
            tokens_used: estimate_tokens(&prompt) + estimate_tokens(&response),
            latency_ms: started.elapsed().as_millis() as u64,
            cache_hit: false,
            redaction_count,
        });

        Ok(finding)
    }
}

/// Redact every event's content and string metadata values, accumulating a
/// single redaction count across the whole bundle.
fn redact_bundle(redactor: &Redactor, bundle: &EvidenceBundle) -> Result<(EvidenceBundle, usize)> {
    let mut total = 0usize;
    let mut events = Vec::with_capacity(bundle.events.len());
    for event in &bundle.events {
        let (content, map) = redactor.redact(&event.content)?;
        total += map.total_redactions;

        let mut metadata = HashMap::with_capacity(event.metadata.len());
        for (key, value) in &event.metadata {
            let (redacted_value, map) = redactor.redact_json_string(value)?;
            total += map.total_redactions;
            metadata.insert(key.clone(), redacted_value);
        }

        events.push(EvidenceEvent {
            id: event.id.clone(),
            source: event.source.clone(),
            event_type: event.event_type.clone(),
            timestamp: event.timestamp,
            content,
            metadata,
        });
    }
    Ok((EvidenceBundle { events }, total))
}

fn build_prompt(preamble: &ContextPreamble, bundle: &EvidenceBundle) -> String {
    let mut user_body = String::new();
    user_body.push_str(&format!("Framework: {}\n", preamble.framework));
    user_body.push_str(&format!("Section: {}\n", preamble.section));
    user_body.push_str(&format!("Excerpt: {}\n", preamble.excerpt));
    user_body.push_str(&format!("Control IDs: {}\n", preamble.control_ids.join(", ")));
    user_body.push_str("Evidence:\n");
    for (i, event) in bundle.events.iter().enumerate() {
        user_body.push_str(&format!(
            "{}. [{}:{}] (id={}) {}\n",
            i + 1,
            event.source,
            event.event_type,
            event.id,
            event.content
        ));
    }

    format!(
        "SYSTEM: You are a compliance analyst. Respond with a single JSON object \
         matching {{title, summary, justification, confidence_score, residual_risk, \
         mapped_controls, citations, severity}}.\n\nUSER:\n{user_body}"
    )
}

fn build_provenance(citations: &[String], bundle: &EvidenceBundle) -> Vec<Provenance> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for citation in citations {
        if let Some(event) = bundle.events.iter().find(|e| &e.id == citation) {
            *counts.entry(event.source.as_str()).or_insert(0) += 1;
        }
    }
    let mut provenance: Vec<Provenance> = counts
        .into_iter()
        .map(|(source, events_used)| Provenance {
            source: source.to_string(),
            events_used,
        })
        .collect();
    provenance.sort_by(|a, b| a.source.cmp(&b.source));
    provenance
}

fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

fn emit_metrics(metrics: CallMetrics) {
    tracing::info!(
        provider = %metrics.provider,
        tokens_used = metrics.tokens_used,
        latency_ms = metrics.latency_ms,
        cache_hit = metrics.cache_hit,
        redaction_count = metrics.redaction_count,
        "analyze call completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AiConfig, RedactionConfig};
    use crate::connector::ConnectorRegistry;
    use crate::model::Rubrics;
    use crate::provider::mock::MockProvider;
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

    fn bundle() -> EvidenceBundle {
        EvidenceBundle::new(vec![EvidenceEvent {
            id: "e1".into(),
            source: "github".into(),
            event_type: "commit".into(),
            timestamp: Utc::now(),
            content: "Enforced MFA on all admin accounts".into(),
            metadata: Default::default(),
        }])
    }

    fn engine(provider: MockProvider, cache_dir: &std::path::Path) -> Engine {
        let config = AiConfig {
            cache_dir: cache_dir.to_path_buf(),
            redaction: RedactionConfig {
                enabled: true,
                denylist: vec![],
            },
            ..AiConfig::default()
        };
        Engine::new(
            config,
            Arc::new(provider),
            Arc::new(ConnectorRegistry::new()),
        )
        .unwrap()
    }

    fn canned_response() -> String {
        serde_json::json!({
            "title": "MFA enforced",
            "summary": "Evidence supports the control",
            "justification": "Commit shows MFA enforcement",
            "confidence_score": 0.9,
            "residual_risk": "low",
            "mapped_controls": ["AC-2"],
            "citations": ["e1", "unknown-id"],
            "severity": "low",
        })
        .to_string()
    }

    #[tokio::test]
    async fn happy_path_produces_finding_with_filtered_citations() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = MockProvider::new("mock").with_default_response(canned_response());
        let engine = engine(provider, tmp.path());

        let finding = engine
            .analyze(CancellationToken::new(), &preamble(), &bundle())
            .await
            .unwrap();

        assert_eq!(finding.citations, vec!["e1".to_string()]);
        assert!(!finding.review_required);
        assert_eq!(finding.mode, "ai");
    }

    #[tokio::test]
    async fn review_required_matches_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let low_confidence = serde_json::json!({
            "title": "t", "summary": "s", "justification": "j",
            "confidence_score": 0.2, "residual_risk": "high",
            "mapped_controls": [], "citations": ["e1"], "severity": "high",
        })
        .to_string();
        let provider = MockProvider::new("mock").with_default_response(low_confidence);
        let engine = engine(provider, tmp.path());

        let finding = engine
            .analyze(CancellationToken::new(), &preamble(), &bundle())
            .await
            .unwrap();
        assert!(finding.review_required);
    }

    #[tokio::test]
    async fn cache_hit_avoids_second_provider_call() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new("mock").with_default_response(canned_response()));
        let config = AiConfig {
            cache_dir: tmp.path().to_path_buf(),
            ..AiConfig::default()
        };
        let engine = Engine::new(
            config,
            provider.clone(),
            Arc::new(ConnectorRegistry::new()),
        )
        .unwrap();

        let p = preamble();
        let b = bundle();
        engine.analyze(CancellationToken::new(), &p, &b).await.unwrap();
        assert_eq!(provider.call_count(), 1);

        let second = engine.analyze(CancellationToken::new(), &p, &b).await.unwrap();
        assert_eq!(second.citations, vec!["e1".to_string()]);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_json_response_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = MockProvider::new("mock").with_default_response("not json");
        let engine = engine(provider, tmp.path());
        let err = engine
            .analyze(CancellationToken::new(), &preamble(), &bundle())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidJson);
    }

    #[tokio::test]
    async fn invalid_preamble_is_rejected_before_any_provider_call() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = MockProvider::new("mock").with_default_response(canned_response());
        let engine = engine(provider, tmp.path());

        let mut bad = preamble();
        bad.framework = String::new();
        let err = engine
            .analyze(CancellationToken::new(), &bad, &bundle())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidPreamble);
    }

    #[tokio::test]
    async fn empty_bundle_proceeds_and_can_still_review_required() {
        let tmp = tempfile::tempdir().unwrap();
        let low_confidence = serde_json::json!({
            "title": "t", "summary": "s", "justification": "j",
            "confidence_score": 0.1, "residual_risk": "",
            "mapped_controls": [], "citations": [], "severity": "low",
        })
        .to_string();
        let provider = MockProvider::new("mock").with_default_response(low_confidence);
        let engine = engine(provider, tmp.path());

        let empty = EvidenceBundle::new(vec![]);
        let finding = engine
            .analyze(CancellationToken::new(), &preamble(), &empty)
            .await
            .unwrap();
        assert!(finding.review_required);
        assert!(finding.citations.is_empty());
    }
}
