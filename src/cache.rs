//! Content-addressed store of prior analyses, with event-change
//! invalidation and a flat-file on-disk layout.
//!
//! The in-memory table is the fast path; the disk directory is the durable
//! record. Construction loads every `<hex>.json` file under `cache_dir`;
//! every `set` writes through with a temp-file-then-rename so a crash
//! mid-write never leaves a partially-written file visible at its final
//! name.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::{AnalysisError, Result};
use crate::metrics::CacheStats;
use crate::model::{AnalysisRequest, CachedResult, EvidenceEvent};

const DEFAULT_STALE_HORIZON: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Content-addressed store of [`CachedResult`]s, backed by a flat directory
/// of `<sha256-hex>.json` files.
pub struct ResponseCache {
    dir: PathBuf,
    table: RwLock<HashMap<String, CachedResult>>,
    tracked_events: RwLock<HashMap<String, String>>,
    stale_horizon: Duration,
}

impl ResponseCache {
    /// Load (or create) a cache rooted at `dir`. Corrupt or unparseable
    /// files are skipped with a warning, not a fatal error — consistent
    /// with "a missing file is not an error".
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| AnalysisError::cache(format!("creating cache dir {dir:?}: {e}")))?;

        let mut table = HashMap::new();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| AnalysisError::cache(format!("reading cache dir {dir:?}: {e}")))?;
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let key = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<CachedResult>(&raw) {
                    Ok(record) => {
                        table.insert(key, record);
                    }
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %e, "skipping unparseable cache file");
                    }
                },
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable cache file");
                }
            }
        }

        Ok(Self {
            dir,
            table: RwLock::new(table),
            tracked_events: RwLock::new(HashMap::new()),
            stale_horizon: DEFAULT_STALE_HORIZON,
        })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn write_through(&self, key: &str, record: &CachedResult) -> Result<()> {
        let path = self.file_path(key);
        let tmp_path = self.dir.join(format!("{key}.json.tmp"));
        let serialized = serde_json::to_vec_pretty(record)
            .map_err(|e| AnalysisError::cache(format!("serializing cache record: {e}")))?;
        std::fs::write(&tmp_path, &serialized)
            .map_err(|e| AnalysisError::cache(format!("writing {tmp_path:?}: {e}")))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| AnalysisError::cache(format!("renaming {tmp_path:?} to {path:?}: {e}")))?;
        Ok(())
    }

    /// Derive the cache key for a request over the given (already redacted)
    /// events: `SHA-256(control_id ‖ framework ‖ policy_excerpt ‖
    /// Σ(event.id ‖ event.source ‖ event.type ‖ event.content))`, hashed in
    /// *input* order — callers supplying events in a different order get a
    /// different key, which is intentional.
    pub fn generate_key(
        control_id: &str,
        framework: &str,
        policy_excerpt: &str,
        events: &[EvidenceEvent],
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(control_id.as_bytes());
        hasher.update(framework.as_bytes());
        hasher.update(policy_excerpt.as_bytes());
        for event in events {
            hasher.update(event.id.as_bytes());
            hasher.update(event.source.as_bytes());
            hasher.update(event.event_type.as_bytes());
            hasher.update(event.content.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Convenience wrapper matching the legacy [`AnalysisRequest`] shape.
    pub fn generate_key_for_request(request: &AnalysisRequest) -> String {
        Self::generate_key(
            &request.control_id,
            &request.framework,
            &request.policy_excerpt,
            &request.events,
        )
    }

    pub fn get(&self, key: &str) -> Option<CachedResult> {
        self.table.read().get(key).cloned()
    }

    pub fn set(&self, key: &str, result: CachedResult) -> Result<()> {
        self.write_through(key, &result)?;
        self.table.write().insert(key.to_string(), result);
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let mut table = self.table.write();
        if table.remove(key).is_some() {
            let path = self.file_path(key);
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| AnalysisError::cache(format!("removing {path:?}: {e}")))?;
            }
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut table = self.table.write();
        for key in table.keys() {
            let path = self.file_path(key);
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| AnalysisError::cache(format!("removing {path:?}: {e}")))?;
            }
        }
        table.clear();
        Ok(())
    }

    /// Delete every record whose `response.citations` intersects
    /// `event_ids`. Returns the number of records deleted.
    pub fn invalidate_by_events(&self, event_ids: &[String]) -> Result<usize> {
        let ids: HashSet<&str> = event_ids.iter().map(String::as_str).collect();
        let mut table = self.table.write();
        let to_delete: Vec<String> = table
            .iter()
            .filter(|(_, record)| {
                record
                    .response
                    .citations
                    .iter()
                    .any(|c| ids.contains(c.as_str()))
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &to_delete {
            table.remove(key);
            let path = self.file_path(key);
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| AnalysisError::cache(format!("removing {path:?}: {e}")))?;
            }
        }
        tracing::info!(count = to_delete.len(), "invalidated cache entries by event");
        Ok(to_delete.len())
    }

    fn event_fingerprint(event: &EvidenceEvent) -> String {
        let title = event
            .metadata
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let mut hasher = Sha256::new();
        hasher.update(event.source.as_bytes());
        hasher.update(event.event_type.as_bytes());
        hasher.update(event.content.as_bytes());
        hasher.update(title.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Record the current fingerprint of `event` for later comparison by
    /// [`Self::detect_changed_events`].
    pub fn track_event(&self, event: &EvidenceEvent) {
        self.tracked_events
            .write()
            .insert(event.id.clone(), Self::event_fingerprint(event));
    }

    /// Ids among `events` whose current fingerprint differs from (or is
    /// absent from) the tracked fingerprint.
    pub fn detect_changed_events(&self, events: &[EvidenceEvent]) -> Vec<String> {
        let tracked = self.tracked_events.read();
        events
            .iter()
            .filter(|e| {
                let current = Self::event_fingerprint(e);
                tracked.get(&e.id).map(|t| t != &current).unwrap_or(true)
            })
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let table = self.table.read();
        let entry_count = table.len();
        let now: DateTime<Utc> = Utc::now();
        let mut total_bytes = 0u64;
        let mut old_entry_count = 0usize;
        for record in table.values() {
            total_bytes += serde_json::to_vec(record).map(|v| v.len() as u64).unwrap_or(0);
            let age = now.signed_duration_since(record.cached_at);
            if age.to_std().unwrap_or_default() > self.stale_horizon {
                old_entry_count += 1;
            }
        }
        CacheStats {
            entry_count,
            total_bytes,
            old_entry_count,
        }
    }

    pub fn with_stale_horizon(mut self, horizon: Duration) -> Self {
        self.stale_horizon = horizon;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
