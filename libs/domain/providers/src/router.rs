//! Counterparty-normalization router: registry-first, generative-fallback (§4.D).

use std::sync::Arc;

use tokio::time::Instant;

use crate::aggregate::{AggregatedResult, AggregationStrategy};
use crate::completion::CallOutcome;
use crate::orchestrator::ProviderOrchestrator;
use crate::provider_trait::AiProvider;
use crate::registry::extract_identifier;

/// Tries each registry adapter (in order) when the input carries a
/// jurisdiction identifier; falls back to the generative orchestrator on
/// error, empty result, or when no identifier was found.
pub struct CounterpartyRouter {
    registries: Vec<Arc<dyn AiProvider>>,
    orchestrator: Arc<ProviderOrchestrator>,
}

impl CounterpartyRouter {
    pub fn new(registries: Vec<Arc<dyn AiProvider>>, orchestrator: Arc<ProviderOrchestrator>) -> Self {
        Self { registries, orchestrator }
    }

    pub async fn normalize(&self, system_prompt: &str, user_prompt: &str, fallback_strategy: AggregationStrategy) -> AggregatedResult {
        if extract_identifier(user_prompt).is_some() {
            for registry in &self.registries {
                let started = Instant::now();
                match registry.complete(system_prompt, user_prompt).await {
                    Ok(completion) => {
                        let call = CallOutcome::success(registry.id(), 0, started.elapsed(), completion.clone());
                        return AggregatedResult { strategy: fallback_strategy, chosen: Some(completion), calls: vec![call] };
                    }
                    Err(_) => continue,
                }
            }
        }
        self.orchestrator.dispatch(system_prompt, user_prompt, fallback_strategy).await
    }
}
