//! Deterministic collector for tests: canned events, injectable errors,
//! call counting.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Connector;
use crate::error::{AnalysisError, Result};
use crate::model::EvidenceEvent;

pub struct MockConnector {
    source: String,
    should_fail: bool,
    canned_events: Mutex<Option<Vec<EvidenceEvent>>>,
    call_count: AtomicU32,
}

impl MockConnector {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            should_fail: false,
            canned_events: Mutex::new(None),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn with_failure(mut self, fail: bool) -> Self {
        self.should_fail = fail;
        self
    }

    pub fn with_events(self, events: Vec<EvidenceEvent>) -> Self {
        *self.canned_events.lock() = Some(events);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn collect(&self, _ctx: CancellationToken, query: &str) -> Result<Vec<EvidenceEvent>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(AnalysisError::mcp_connector_failed(format!(
                "mock connector {} failed on query {query:?}",
                self.source
            )));
        }

        let canned = self.canned_events.lock().clone();
        Ok(canned.unwrap_or_else(|| {
            vec![EvidenceEvent {
                id: Uuid::new_v4().to_string(),
                source: self.source.clone(),
                event_type: "mock".to_string(),
                timestamp: Utc::now(),
                content: format!("mock evidence for query {query:?}"),
                metadata: Default::default(),
            }]
        }))
    }

    async fn health(&self, _ctx: CancellationToken) -> Result<()> {
        if self.should_fail {
            Err(AnalysisError::unavailable("mock connector unhealthy"))
        } else {
            Ok(())
        }
    }

    fn source(&self) -> &str {
        &self.source
    }
}
