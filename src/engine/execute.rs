//! `ExecutePlan`: parallel, bounded, partial-failure-tolerant collection of
//! approved plan items through the connector registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::Engine;
use crate::error::{AnalysisError, Result};
use crate::model::{EvidenceBundle, EvidenceEvent, EvidencePlan, ExecutionStatus, PlanStatus};

impl Engine {
    /// Execute every approved/auto-approved item in `plan`, mutating each
    /// item's `execution_status`/`events_collected`/`error` in place and
    /// returning the merged bundle of newly collected events.
    pub async fn execute_plan(
        &self,
        ctx: CancellationToken,
        plan: &mut EvidencePlan,
    ) -> Result<EvidenceBundle> {
        if plan.status != PlanStatus::Approved {
            return Err(AnalysisError::plan_not_approved());
        }

        let executable: Vec<usize> = plan
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_executable())
            .map(|(idx, _)| idx)
            .collect();
        if executable.is_empty() {
            return Err(AnalysisError::no_approved_items());
        }

        if ctx.is_cancelled() {
            return Err(AnalysisError::cancelled());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max_collections.max(1)));
        let per_item_timeout = Duration::from_secs(self.config.timeout_secs);
        let connectors = self.connectors.clone();

        for &idx in &executable {
            plan.items[idx].execution_status = ExecutionStatus::Running;
        }

        let mut join_set = JoinSet::new();
        for &idx in &executable {
            let item = &plan.items[idx];
            let source = item.source.clone();
            let query = item.query.clone();
            let semaphore = semaphore.clone();
            let connectors = connectors.clone();
            let ctx = ctx.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let collected = tokio::select! {
                    res = tokio::time::timeout(per_item_timeout, connectors.collect(ctx.clone(), &source, &query)) => {
                        match res {
                            Ok(inner) => inner,
                            Err(_) => Err(AnalysisError::timeout(format!(
                                "collector for {source} timed out after {per_item_timeout:?}"
                            ))),
                        }
                    }
                    _ = ctx.cancelled() => Err(AnalysisError::cancelled()),
                };
                (idx, collected)
            });
        }

        let mut results: Vec<(usize, Result<Vec<EvidenceEvent>>)> = Vec::with_capacity(executable.len());
        while let Some(joined) = join_set.join_next().await {
            results.push(joined.expect("executor task never panics"));
        }
        results.sort_by_key(|(idx, _)| *idx);

        let mut merged = EvidenceBundle::default();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut any_cancelled = false;
        let mut successes = 0usize;

        for (idx, outcome) in results {
            match outcome {
                Ok(events) => {
                    successes += 1;
                    let normalized = normalize_events(events, &plan.items[idx].source, &mut seen_ids);
                    plan.items[idx].execution_status = ExecutionStatus::Complete;
                    plan.items[idx].events_collected = normalized.len();
                    merged.events.extend(normalized);
                }
                Err(err) => {
                    if err.kind == crate::error::ErrorKind::Cancelled {
                        any_cancelled = true;
                    }
                    plan.items[idx].execution_status = ExecutionStatus::Failed;
                    plan.items[idx].error = err.message.clone();
                }
            }
        }

        if any_cancelled && successes == 0 {
            return Err(AnalysisError::cancelled());
        }

        if successes == 0 {
            return Err(AnalysisError::mcp_connector_failed(
                "every executed plan item failed",
            ));
        }

        plan.status = PlanStatus::Executed;
        Ok(merged)
    }
}

/// Stamp missing timestamps with the collection moment and suffix ids that
/// collide with an id already seen (across sources) with `source:` to
/// restore uniqueness.
fn normalize_events(
    events: Vec<EvidenceEvent>,
    source: &str,
    seen_ids: &mut HashSet<String>,
) -> Vec<EvidenceEvent> {
    let now = Utc::now();
    events
        .into_iter()
        .map(|mut event| {
            if event.timestamp.timestamp() == 0 {
                event.timestamp = now;
            }
            if seen_ids.contains(&event.id) {
                event.id = format!("{source}:{}", event.id);
            }
            seen_ids.insert(event.id.clone());
            event
        })
        .collect()
}
