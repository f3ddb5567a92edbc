//! Fans a prompt out across the configured providers and aggregates the
//! responses (§4.D).

use std::sync::Arc;
use std::time::Duration;

use refnorm_models::ProviderDescriptor;
use refnorm_ratelimit::{BreakerConfig, BucketConfig, CircuitBreaker, Outcome, TokenBucket};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::aggregate::{aggregate, AggregatedResult, AggregationStrategy};
use crate::completion::CallOutcome;
use crate::error::ProviderError;
use crate::provider_trait::AiProvider;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

struct ProviderHandle {
    descriptor: ProviderDescriptor,
    adapter: Arc<dyn AiProvider>,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
}

/// Holds the configured set of providers and dispatches prompts to them
/// in parallel, each provider contributing its configured channel count
/// as independent concurrent calls (§4.D).
pub struct ProviderOrchestrator {
    handles: Vec<Arc<ProviderHandle>>,
    call_timeout: Duration,
}

impl ProviderOrchestrator {
    pub fn new(providers: Vec<(ProviderDescriptor, Arc<dyn AiProvider>)>) -> Self {
        Self::with_call_timeout(providers, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_call_timeout(providers: Vec<(ProviderDescriptor, Arc<dyn AiProvider>)>, call_timeout: Duration) -> Self {
        let handles = providers
            .into_iter()
            .map(|(descriptor, adapter)| {
                let limiter = TokenBucket::new(BucketConfig {
                    requests_per_second: descriptor.rate_limit.requests_per_second,
                    burst: descriptor.rate_limit.burst,
                });
                let breaker = CircuitBreaker::new(BreakerConfig {
                    failure_threshold: descriptor.circuit_breaker.failure_threshold,
                    success_threshold: descriptor.circuit_breaker.success_threshold,
                    cooldown: Duration::from_secs(descriptor.circuit_breaker.cooldown_secs),
                });
                Arc::new(ProviderHandle { descriptor, adapter, limiter, breaker })
            })
            .collect();
        Self { handles, call_timeout }
    }

    /// Dispatch one prompt, enumerating active providers (enabled, circuit
    /// not open), spawning `channels` concurrent calls per provider, and
    /// aggregating the outcomes with `strategy`.
    pub async fn dispatch(&self, system_prompt: &str, user_prompt: &str, strategy: AggregationStrategy) -> AggregatedResult {
        let active = self.active_handles().await;
        let mut set = JoinSet::new();
        for handle in active {
            for channel in 0..handle.descriptor.channels.max(1) {
                let handle = handle.clone();
                let system_prompt = system_prompt.to_string();
                let user_prompt = user_prompt.to_string();
                let call_timeout = self.call_timeout;
                set.spawn(async move { call_one(handle, channel, &system_prompt, &user_prompt, call_timeout).await });
            }
        }

        let mut calls = Vec::new();
        while let Some(joined) = set.join_next().await {
            let Ok(outcome) = joined else { continue };
            let is_success = outcome.is_success();
            calls.push(outcome);
            if strategy == AggregationStrategy::FirstSuccess && is_success {
                set.abort_all();
                break;
            }
        }
        aggregate(strategy, calls)
    }

    /// Sum of enabled providers' configured channel counts — the ceiling
    /// the scheduler folds into its worker budget at fan-in (§4.H).
    pub fn total_channel_capacity(&self) -> usize {
        self.handles.iter().filter(|h| h.descriptor.enabled).map(|h| h.descriptor.channels.max(1) as usize).sum()
    }

    /// True once every configured provider's breaker is open — the
    /// orchestrator-wide "upstream unavailable" condition of §7.
    pub async fn all_breakers_open(&self) -> bool {
        for handle in &self.handles {
            if handle.descriptor.enabled && handle.breaker.allow().await.is_ok() {
                return false;
            }
        }
        !self.handles.is_empty()
    }

    async fn active_handles(&self) -> Vec<Arc<ProviderHandle>> {
        let mut active = Vec::new();
        for handle in &self.handles {
            if handle.descriptor.enabled && handle.breaker.allow().await.is_ok() {
                active.push(handle.clone());
            }
        }
        active
    }
}

async fn call_one(handle: Arc<ProviderHandle>, channel: u32, system_prompt: &str, user_prompt: &str, call_timeout: Duration) -> CallOutcome {
    let started = Instant::now();

    if handle.limiter.acquire(call_timeout).await.is_err() {
        return CallOutcome::failure(handle.descriptor.id.clone(), channel, started.elapsed(), &ProviderError::RateLimited);
    }

    let outcome = tokio::time::timeout(call_timeout, handle.adapter.complete(system_prompt, user_prompt)).await;
    let latency = started.elapsed();

    match outcome {
        Ok(Ok(completion)) => {
            handle.breaker.record(Outcome::Success).await;
            CallOutcome::success(handle.descriptor.id.clone(), channel, latency, completion)
        }
        Ok(Err(err)) => {
            if err.counts_as_breaker_failure() {
                handle.breaker.record(Outcome::Failure).await;
            }
            CallOutcome::failure(handle.descriptor.id.clone(), channel, latency, &err)
        }
        Err(_) => CallOutcome::failure(handle.descriptor.id.clone(), channel, latency, &ProviderError::Timeout),
    }
}
