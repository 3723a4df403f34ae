//! Core data model shared by every component: preambles, evidence, findings,
//! plans and the cached-result record.
//!
//! Nothing in this module talks to the network or the filesystem; it only
//! defines shapes and the validation/derivation rules the spec pins down.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AnalysisError, Result};

/// Default confidence threshold below which a finding is flagged for review.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;
/// Default number of citations a rubric expects a finding to carry.
pub const DEFAULT_REQUIRED_CITATIONS: usize = 3;

fn default_risk_levels() -> Vec<String> {
    vec!["low".into(), "medium".into(), "high".into()]
}

/// Scoring rubric attached to a [`ContextPreamble`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubrics {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_risk_levels")]
    pub risk_levels: Vec<String>,
    #[serde(default = "default_required_citations")]
    pub required_citations: usize,
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_required_citations() -> usize {
    DEFAULT_REQUIRED_CITATIONS
}

impl Default for Rubrics {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            risk_levels: default_risk_levels(),
            required_citations: DEFAULT_REQUIRED_CITATIONS,
        }
    }
}

/// The policy context prepended to every prompt. Immutable once constructed:
/// [`ContextPreamble::new`] validates once and the value never changes
/// afterwards, so re-validation is always a no-op (idempotent by construction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPreamble {
    pub framework: String,
    pub version: String,
    pub section: String,
    pub excerpt: String,
    pub control_ids: Vec<String>,
    #[serde(default)]
    pub rubrics: Rubrics,
    pub created_at: DateTime<Utc>,
}

static CONTROL_ID_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

impl ContextPreamble {
    /// Construct and validate a preamble. Construction is the only place
    /// validation happens; the resulting value is immutable.
    pub fn new(
        framework: impl Into<String>,
        version: impl Into<String>,
        section: impl Into<String>,
        excerpt: impl Into<String>,
        control_ids: Vec<String>,
        rubrics: Rubrics,
    ) -> Result<Self> {
        let preamble = Self {
            framework: framework.into(),
            version: version.into(),
            section: section.into(),
            excerpt: excerpt.into(),
            control_ids,
            rubrics,
            created_at: Utc::now(),
        };
        preamble.validate()?;
        Ok(preamble)
    }

    /// Re-check every invariant. Safe to call repeatedly: a valid preamble
    /// never stops being valid (it is immutable), so this is idempotent.
    pub fn validate(&self) -> Result<()> {
        if self.framework.trim().is_empty() {
            return Err(AnalysisError::invalid_preamble("framework must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(AnalysisError::invalid_preamble("version must not be empty"));
        }
        if self.section.trim().is_empty() {
            return Err(AnalysisError::invalid_preamble("section must not be empty"));
        }
        let len = self.excerpt.chars().count();
        if !(50..=10_000).contains(&len) {
            return Err(AnalysisError::invalid_preamble(format!(
                "excerpt length must be in [50, 10000], got {len}"
            )));
        }
        for id in &self.control_ids {
            if !CONTROL_ID_RE.is_match(id) {
                return Err(AnalysisError::invalid_preamble(format!(
                    "control id {id:?} does not match [A-Za-z0-9._-]+"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.rubrics.confidence_threshold) {
            return Err(AnalysisError::invalid_preamble(
                "rubrics.confidence_threshold must be in [0, 1]",
            ));
        }
        if self.rubrics.risk_levels.is_empty() {
            return Err(AnalysisError::invalid_preamble(
                "rubrics.risk_levels must not be empty",
            ));
        }
        Ok(())
    }
}

/// A single piece of evidence collected (or supplied) from a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEvent {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// An ordered sequence of evidence. Order is preserved for display; cache-key
/// computation always hashes in the order the bundle was supplied in (see
/// [`crate::cache::ResponseCache::generate_key`]) — it does not sort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub events: Vec<EvidenceEvent>,
}

impl EvidenceBundle {
    pub fn new(events: Vec<EvidenceEvent>) -> Self {
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Event ids, sorted — used for fingerprinting, never for cache keys.
    pub fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.events.iter().map(|e| e.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.events.iter().any(|e| e.id == id)
    }

    pub fn merge(&mut self, other: EvidenceBundle) {
        self.events.extend(other.events);
    }
}

/// Legacy/explicit request form. `cache_key` is always derived, never
/// accepted from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub request_id: String,
    pub control_id: String,
    pub control_name: String,
    pub framework: String,
    pub policy_excerpt: String,
    pub events: Vec<EvidenceEvent>,
    pub timestamp: DateTime<Utc>,
    pub cache_key: String,
}

/// Per-source citation accounting attached to a [`Finding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub events_used: usize,
}

/// The structured output of a single analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub control_id: String,
    pub framework_id: String,
    pub title: String,
    pub summary: String,
    pub justification: String,
    pub severity: String,
    pub confidence_score: f64,
    pub residual_risk: String,
    pub mapped_controls: Vec<String>,
    pub citations: Vec<String>,
    pub review_required: bool,
    pub mode: String,
    pub provenance: Vec<Provenance>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Approval state of a single plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    AutoApproved,
    Denied,
}

/// Execution state of a single plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// A single `(source, query)` evidence-collection probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub source: String,
    pub query: String,
    pub signal_strength: f64,
    pub rationale: String,
    pub approval_status: ApprovalStatus,
    pub auto_approved: bool,
    pub execution_status: ExecutionStatus,
    pub events_collected: usize,
    pub error: String,
}

impl PlanItem {
    pub fn new(source: String, query: String, signal_strength: f64, rationale: String) -> Self {
        Self {
            source,
            query,
            signal_strength,
            rationale,
            approval_status: ApprovalStatus::Pending,
            auto_approved: false,
            execution_status: ExecutionStatus::Pending,
            events_collected: 0,
            error: String::new(),
        }
    }

    pub fn is_executable(&self) -> bool {
        matches!(
            self.approval_status,
            ApprovalStatus::Approved | ApprovalStatus::AutoApproved
        )
    }
}

/// Lifecycle status of an [`EvidencePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Approved,
    Denied,
    Executed,
}

/// A deterministic, budget-respecting evidence-collection plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePlan {
    pub id: String,
    pub framework: String,
    pub section: String,
    pub status: PlanStatus,
    pub items: Vec<PlanItem>,
    pub estimated_sources: usize,
    pub estimated_calls: u32,
    pub estimated_tokens: u32,
    pub created_at: DateTime<Utc>,
}

impl EvidencePlan {
    /// Approve every item whose status is `pending` or already auto-approved,
    /// and flip the plan to `approved`. Denied items stay denied.
    pub fn approve_all_pending(&mut self) {
        for item in &mut self.items {
            if item.approval_status == ApprovalStatus::Pending {
                item.approval_status = ApprovalStatus::Approved;
            }
        }
        self.status = PlanStatus::Approved;
    }
}

/// Type of redacted match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RedactionType {
    Pii,
    Secret,
}

/// One redaction performed within a single [`crate::redact::Redactor::redact`]
/// call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionEntry {
    /// SHA-256 hex of the original substring — never the plaintext.
    pub hash: String,
    pub placeholder: String,
    #[serde(rename = "type")]
    pub kind: RedactionType,
    pub position: usize,
    pub timestamp: DateTime<Utc>,
}

/// Accumulator returned alongside every redacted string. Owned by the caller
/// of `redact`; never shared across calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionMap {
    pub total_redactions: usize,
    pub entries: Vec<RedactionEntry>,
    /// Set when replaced bytes exceed 40% of the input. Informational only.
    pub high_redaction_ratio: bool,
}

impl RedactionMap {
    pub fn merge(&mut self, other: RedactionMap) {
        self.total_redactions += other.total_redactions;
        self.entries.extend(other.entries);
        self.high_redaction_ratio = self.high_redaction_ratio || other.high_redaction_ratio;
    }
}

/// A cached analysis, keyed by [`crate::cache::ResponseCache::generate_key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    pub cache_key: String,
    pub response: Finding,
    pub cached_at: DateTime<Utc>,
    pub event_ids: Vec<String>,
    pub control_id: String,
    pub provider: String,
    pub model_version: String,
}
