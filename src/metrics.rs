//! Observability types produced per call and per cache, emitted as `tracing`
//! events at the call sites that fill them in (see [`crate::engine`] and
//! [`crate::cache`]).

use serde::{Deserialize, Serialize};

/// Emitted once per `analyze`/`propose_plan` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetrics {
    pub provider: String,
    pub tokens_used: u32,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub redaction_count: usize,
}

/// Snapshot of the response cache's state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub old_entry_count: usize,
}
