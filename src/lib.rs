//! Evidentia core: a compliance-evidence analysis orchestration engine.
//!
//! Given a policy excerpt and a bundle of heterogeneous evidence events,
//! [`engine::Engine::analyze`] produces a confidence-scored,
//! citation-backed [`model::Finding`]. In autonomous mode,
//! [`engine::Engine::propose_plan`] and [`engine::Engine::execute_plan`]
//! generate and run an evidence-collection plan before analysis.
//!
//! CLI entry points, configuration loading from disk/env, TUI panels and
//! connector discovery are out of scope — this crate only defines the
//! interfaces ([`provider::Provider`], [`connector::Connector`]) those
//! external collaborators implement against.

pub mod approve;
pub mod cache;
pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod provider;
pub mod redact;

pub use engine::Engine;
pub use error::{AnalysisError, ErrorKind, Result};
