//! Error taxonomy for a single provider call (§4.C, §4.D).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    HttpStatus(u16),
    #[error("call timed out")]
    Timeout,
    #[error("rate limit acquisition timed out")]
    RateLimited,
    #[error("circuit breaker open")]
    BreakerOpen,
    #[error("response had no usable completion")]
    EmptyResponse,
    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// §4.C classification: any HTTP 5xx or transport failure counts
    /// against the circuit breaker; timeouts and breaker-open do not
    /// (the breaker isn't re-penalized for already being open, and a
    /// client-side timeout says nothing about the provider's health).
    pub fn counts_as_breaker_failure(&self) -> bool {
        matches!(self, ProviderError::Transport(_) | ProviderError::HttpStatus(500..=599))
    }
}
