//! Exponential backoff retry controller. Retries only retryable errors;
//! fatal errors propagate on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{AnalysisError, Result};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Drives retries of a fallible async operation under exponential backoff.
pub struct RetryController {
    /// Overall deadline for the whole retry loop — the configured timeout.
    ceiling: Duration,
}

impl RetryController {
    pub fn new(ceiling: Duration) -> Self {
        Self { ceiling }
    }

    /// Run `operation` until it succeeds, returns a fatal error, or the
    /// ceiling/cancellation fires. `operation` is invoked at least once.
    pub async fn execute<F, Fut, T>(&self, ctx: CancellationToken, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = tokio::time::Instant::now() + self.ceiling;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if ctx.is_cancelled() {
                return Err(AnalysisError::cancelled());
            }

            let attempt = tokio::select! {
                res = operation() => res,
                _ = ctx.cancelled() => return Err(AnalysisError::cancelled()),
            };

            match attempt {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(err);
                    }
                    let sleep_for = backoff.min(MAX_BACKOFF).min(
                        deadline.saturating_duration_since(tokio::time::Instant::now()),
                    );
                    tracing::warn!(
                        error = %err,
                        backoff_ms = sleep_for.as_millis() as u64,
                        "retrying after retryable provider error"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(sleep_for) => {}
                        _ = ctx.cancelled() => return Err(AnalysisError::cancelled()),
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}
