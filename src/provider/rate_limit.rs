//! Token-bucket rate limiter pacing calls into a [`super::Provider`].

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{AnalysisError, Result};

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

/// Token bucket parameterised by requests-per-minute. `rpm == 0` means
/// unbounded: `wait` always returns immediately.
pub struct RateLimiter {
    rpm: u32,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(rpm: u32) -> Self {
        let capacity = if rpm == 0 { 0.0 } else { (rpm as f64 / 60.0).max(1.0) };
        Self {
            rpm,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                refill_per_sec: rpm as f64 / 60.0,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until a token is available or `ctx` is cancelled.
    pub async fn wait(&self, ctx: CancellationToken) -> Result<()> {
        if self.rpm == 0 {
            return Ok(());
        }
        loop {
            let wait_for = {
                let mut bucket = self.bucket.lock();
                refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(());
                }
                let deficit = 1.0 - bucket.tokens;
                Duration::from_secs_f64(deficit / bucket.refill_per_sec.max(f64::MIN_POSITIVE))
            };

            tokio::select! {
                _ = tokio::time::sleep(wait_for) => {}
                _ = ctx.cancelled() => return Err(AnalysisError::cancelled()),
            }
        }
    }
}

fn refill(bucket: &mut Bucket) {
    let now = Instant::now();
    let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
    bucket.tokens = (bucket.tokens + elapsed * bucket.refill_per_sec).min(bucket.capacity);
    bucket.last_refill = now;
}
