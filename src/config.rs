//! Configuration surface the engine is parameterized by.
//!
//! Loading a [`Config`] from disk/env is the caller's job (out of scope per
//! the spec); this module only defines the shape, its defaults, and the
//! validation each dependent component runs once at construction.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ai: AiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai: AiConfig::default(),
        }
    }
}

/// Operating mode: analyse supplied evidence, or plan-then-collect-then-analyse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Context,
    Autonomous,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Context
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub provider: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub rate_limit_rpm: u32,
    pub mode: Mode,
    pub redaction: RedactionConfig,
    pub autonomous: AutonomousConfig,
    pub budgets: BudgetConfig,
    pub concurrency: ConcurrencyConfig,
    pub cache_dir: PathBuf,
    pub no_cache: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "mock".into(),
            model: "default".into(),
            timeout_secs: 30,
            max_tokens: 4096,
            temperature: 0.2,
            rate_limit_rpm: 60,
            mode: Mode::default(),
            redaction: RedactionConfig::default(),
            autonomous: AutonomousConfig::default(),
            budgets: BudgetConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            cache_dir: PathBuf::from(".evidentia-cache"),
            no_cache: false,
        }
    }
}

impl AiConfig {
    /// Validate the ambient config shape. Individual components
    /// (`Redactor::new`, rate limiter, etc.) run their own, narrower
    /// validation against the sub-sections they consume; this checks the
    /// cross-cutting invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider.trim().is_empty() {
            return Err("ai.provider must not be empty".into());
        }
        if self.model.trim().is_empty() {
            return Err("ai.model must not be empty".into());
        }
        if self.timeout_secs == 0 {
            return Err("ai.timeout_secs must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub denylist: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            denylist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousConfig {
    pub enabled: bool,
    pub auto_approve: HashMap<String, Vec<String>>,
}

impl Default for AutonomousConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_approve: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_sources: usize,
    pub max_api_calls: u32,
    pub max_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_sources: 10,
            max_api_calls: 50,
            max_tokens: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_collections: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_collections: 4 }
    }
}
