//! Per-provider token-bucket rate limiter (§4.C).

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{self, Instant};

/// Token-bucket parameters. Mirrors `refnorm_models::RateLimitConfig` but
/// this crate stays independent of the domain-model crate so it can be
/// reused by anything that needs a standalone limiter.
#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    pub requests_per_second: f64,
    pub burst: u32,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self { requests_per_second: 5.0, burst: 5 }
    }
}

/// Returned by [`TokenBucket::acquire`] when the caller-supplied deadline
/// elapses before a token becomes available.
#[derive(Debug, thiserror::Error)]
#[error("rate limit acquisition timed out after {0:?}")]
pub struct AcquireTimeout(pub Duration);

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single provider's token bucket. `acquire` blocks the calling task
/// until a token is available or `deadline` elapses; the wait is a normal
/// async await, so it composes with `tokio::select!`/cancellation exactly
/// like any other future.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: BucketConfig) -> Self {
        Self {
            capacity: config.burst.max(1) as f64,
            refill_per_sec: config.requests_per_second.max(0.001),
            state: Mutex::new(BucketState { tokens: config.burst.max(1) as f64, last_refill: Instant::now() }),
        }
    }

    /// Wait for one token, up to `deadline`. Returns `Ok(())` once a token
    /// is consumed, `Err(AcquireTimeout)` if `deadline` elapses first.
    pub async fn acquire(&self, deadline: Duration) -> Result<(), AcquireTimeout> {
        time::timeout(deadline, self.acquire_unbounded())
            .await
            .map_err(|_| AcquireTimeout(deadline))
    }

    async fn acquire_unbounded(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };
            match wait {
                None => return,
                Some(wait) => time::sleep(wait).await,
            }
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_up_to_burst_immediately() {
        let bucket = TokenBucket::new(BucketConfig { requests_per_second: 1.0, burst: 3 });
        for _ in 0..3 {
            bucket.acquire(Duration::from_millis(10)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn exhausted_bucket_times_out_on_tight_deadline() {
        let bucket = TokenBucket::new(BucketConfig { requests_per_second: 1.0, burst: 1 });
        bucket.acquire(Duration::from_millis(10)).await.unwrap();
        let result = bucket.acquire(Duration::from_millis(5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn refills_over_time() {
        let bucket = TokenBucket::new(BucketConfig { requests_per_second: 100.0, burst: 1 });
        bucket.acquire(Duration::from_millis(10)).await.unwrap();
        let result = bucket.acquire(Duration::from_millis(50)).await;
        assert!(result.is_ok());
    }
}
