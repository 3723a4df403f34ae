//! Error taxonomy for the analysis orchestration engine.
//!
//! Every fallible public operation returns [`AnalysisError`], which wraps an
//! [`ErrorKind`] so callers can match on kind without parsing strings. The
//! kind also encodes whether the error is retryable (see
//! [`ErrorKind::is_retryable`]), which the retry controller in
//! [`crate::provider::retry`] relies on directly.

use thiserror::Error;

/// Stable classification of every error the engine can produce.
///
/// Variants map 1:1 onto the taxonomy the spec assigns to each component;
/// do not add a new variant without deciding its retryability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Request validation
    InvalidRequest,
    NoEvents,
    InvalidPreamble,

    // Provider (retryable)
    Timeout,
    RateLimit,
    Unavailable,

    // Provider (fatal)
    Auth,
    Quota,
    InvalidJson,

    // Planner
    NoPlanItems,
    BudgetExceeded,

    // Executor
    PlanNotApproved,
    NoApprovedItems,
    McpConnectorFailed,

    // Cache / I/O
    Cache,

    // Cancellation
    Cancelled,
}

impl ErrorKind {
    /// Whether the retry controller should retry an error of this kind.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimit | ErrorKind::Unavailable
        )
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::NoEvents => "NO_EVENTS",
            ErrorKind::InvalidPreamble => "INVALID_PREAMBLE",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::Auth => "AUTH",
            ErrorKind::Quota => "QUOTA",
            ErrorKind::InvalidJson => "INVALID_JSON",
            ErrorKind::NoPlanItems => "ERR_NO_PLAN_ITEMS",
            ErrorKind::BudgetExceeded => "ERR_BUDGET_EXCEEDED",
            ErrorKind::PlanNotApproved => "ERR_PLAN_NOT_APPROVED",
            ErrorKind::NoApprovedItems => "ERR_NO_APPROVED_ITEMS",
            ErrorKind::McpConnectorFailed => "ERR_MCP_CONNECTOR_FAILED",
            ErrorKind::Cache => "CACHE_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

/// The engine's single error type.
#[derive(Debug, Error)]
#[error("{kind_code}: {message}", kind_code = self.kind.code())]
pub struct AnalysisError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AnalysisError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn invalid_preamble(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPreamble, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Quota, message)
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidJson, message)
    }

    pub fn no_plan_items() -> Self {
        Self::new(ErrorKind::NoPlanItems, "provider returned zero plan items")
    }

    pub fn budget_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetExceeded, message)
    }

    pub fn plan_not_approved() -> Self {
        Self::new(
            ErrorKind::PlanNotApproved,
            "plan must be in the approved state before execution",
        )
    }

    pub fn no_approved_items() -> Self {
        Self::new(
            ErrorKind::NoApprovedItems,
            "no plan item has approval_status approved or auto_approved",
        )
    }

    pub fn mcp_connector_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::McpConnectorFailed, message)
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cache, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
