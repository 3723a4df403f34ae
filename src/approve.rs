//! Per-source glob policy for auto-approving plan items.

use std::collections::HashMap;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::AutonomousConfig;
use crate::error::Result;

/// Precompiled per-source glob policy. Construction compiles every glob
/// once; [`Self::matches`] never fails and is lock-free, hash-lookup-bound.
pub struct AutoApproveMatcher {
    enabled: bool,
    by_source: HashMap<String, GlobSet>,
}

impl AutoApproveMatcher {
    /// Build a matcher from config. A malformed glob pattern is skipped —
    /// config validation is expected to catch that earlier — so runtime
    /// calls to `matches` never fail.
    pub fn new(config: &AutonomousConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self {
                enabled: false,
                by_source: HashMap::new(),
            });
        }

        let mut by_source = HashMap::new();
        for (source, patterns) in &config.auto_approve {
            let mut builder = GlobSetBuilder::new();
            for pattern in patterns {
                match Glob::new(&pattern.to_lowercase()) {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => {
                        tracing::warn!(source = %source, pattern = %pattern, error = %e, "skipping malformed auto-approve glob");
                    }
                }
            }
            match builder.build() {
                Ok(set) => {
                    by_source.insert(source.to_lowercase(), set);
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "failed to compile glob set for source");
                }
            }
        }

        Ok(Self {
            enabled: true,
            by_source,
        })
    }

    /// Whether `query` is auto-approved for `source`.
    pub fn matches(&self, source: &str, query: &str) -> bool {
        if !self.enabled || source.is_empty() || query.is_empty() {
            return false;
        }
        match self.by_source.get(&source.to_lowercase()) {
            Some(set) => set.is_match(query.to_lowercase()),
            None => false,
        }
    }
}
