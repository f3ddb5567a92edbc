//! Per-provider circuit breaker (§4.C): closed → open → half-open → closed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, success_threshold: 2, cooldown: Duration::from_secs(30) }
    }
}

/// The breaker's externally-observable state, independent of the internal
/// counters that drive transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, thiserror::Error)]
#[error("circuit breaker open")]
pub struct BreakerOpen;

enum Internal {
    Closed,
    /// Tripped at this instant; still within cooldown or just past it.
    Open(Instant),
    HalfOpen,
}

/// Outcome of a completed call, used to drive the breaker's state machine.
/// Per §4.C: any HTTP 5xx or transport failure is a `Failure`; 2xx is a
/// `Success`; 4xx is neither and must not be reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// A single provider's circuit breaker. Thread-safe via an async `RwLock`
/// guarding the one piece of mutable transition state, plus lock-free
/// atomic counters for the hot failure/success tally.
pub struct CircuitBreaker {
    config: BreakerConfig,
    consecutive_failures: AtomicU32,
    half_open_successes: AtomicU32,
    inner: RwLock<Internal>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            inner: RwLock::new(Internal::Closed),
        }
    }

    /// Whether a call may proceed right now. Transitions `Open` to
    /// `HalfOpen` once the cooldown has elapsed, per §4.C.
    pub async fn allow(&self) -> Result<(), BreakerOpen> {
        {
            let guard = self.inner.read().await;
            match &*guard {
                Internal::Closed | Internal::HalfOpen => return Ok(()),
                Internal::Open(tripped_at) if tripped_at.elapsed() < self.config.cooldown => {
                    return Err(BreakerOpen)
                }
                Internal::Open(_) => {}
            }
        }
        let mut guard = self.inner.write().await;
        if let Internal::Open(tripped_at) = &*guard {
            if tripped_at.elapsed() >= self.config.cooldown {
                *guard = Internal::HalfOpen;
                self.half_open_successes.store(0, Ordering::Relaxed);
                tracing::info!("circuit breaker: cooldown elapsed, probing (half-open)");
            }
        }
        match &*guard {
            Internal::Open(_) => Err(BreakerOpen),
            _ => Ok(()),
        }
    }

    /// Record the outcome of a call that `allow()` admitted.
    pub async fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.record_success().await,
            Outcome::Failure => self.record_failure().await,
        }
    }

    async fn record_success(&self) {
        let guard = self.inner.read().await;
        match &*guard {
            Internal::HalfOpen => {
                let count = self.half_open_successes.fetch_add(1, Ordering::Relaxed) + 1;
                if count >= self.config.success_threshold {
                    drop(guard);
                    let mut guard = self.inner.write().await;
                    *guard = Internal::Closed;
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    tracing::info!("circuit breaker: closed after {} probe successes", count);
                }
            }
            Internal::Closed => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            Internal::Open(_) => {}
        }
    }

    async fn record_failure(&self) {
        let guard = self.inner.read().await;
        match &*guard {
            Internal::HalfOpen => {
                drop(guard);
                let mut guard = self.inner.write().await;
                *guard = Internal::Open(Instant::now());
                self.consecutive_failures.store(self.config.failure_threshold, Ordering::Relaxed);
                tracing::warn!("circuit breaker: probe failed, reopening");
            }
            Internal::Closed => {
                let count = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if count >= self.config.failure_threshold {
                    drop(guard);
                    let mut guard = self.inner.write().await;
                    if matches!(&*guard, Internal::Closed) {
                        *guard = Internal::Open(Instant::now());
                        tracing::error!(
                            "circuit breaker: tripped after {} consecutive failures, cooling down {:?}",
                            count, self.config.cooldown
                        );
                    }
                }
            }
            Internal::Open(_) => {}
        }
    }

    pub async fn state(&self) -> BreakerState {
        match &*self.inner.read().await {
            Internal::Closed => BreakerState::Closed,
            Internal::Open(_) => BreakerState::Open,
            Internal::HalfOpen => BreakerState::HalfOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig { failure_threshold: 2, success_threshold: 2, cooldown: Duration::from_millis(20) }
    }

    #[tokio::test]
    async fn trips_open_after_threshold_failures() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.allow().await.unwrap();
        breaker.record(Outcome::Failure).await;
        breaker.allow().await.unwrap();
        breaker.record(Outcome::Failure).await;
        assert_eq!(breaker.state().await, BreakerState::Open);
        assert!(breaker.allow().await.is_err());
    }

    #[tokio::test]
    async fn half_opens_after_cooldown_and_closes_on_success_threshold() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.record(Outcome::Failure).await;
        breaker.record(Outcome::Failure).await;
        assert_eq!(breaker.state().await, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        breaker.allow().await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);

        breaker.record(Outcome::Success).await;
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);
        breaker.record(Outcome::Success).await;
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_and_resets_cooldown() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.record(Outcome::Failure).await;
        breaker.record(Outcome::Failure).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        breaker.allow().await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);

        breaker.record(Outcome::Failure).await;
        assert_eq!(breaker.state().await, BreakerState::Open);
        assert!(breaker.allow().await.is_err());
    }
}
