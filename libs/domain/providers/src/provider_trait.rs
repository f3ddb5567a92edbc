//! The adapter seam every AI backend (generative or registry) implements.

use async_trait::async_trait;

use crate::completion::Completion;
use crate::error::ProviderError;

/// A single AI backend: given a system prompt (instructions) and a user
/// prompt (the actual query plus candidate enumeration, where relevant),
/// produce one completion. Implementors own their own HTTP client and
/// authentication; the orchestrator owns rate limiting and breaker state.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion, ProviderError>;
}
