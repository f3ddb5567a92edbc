//! The result of one provider call and of one orchestrated round (§4.D).

use std::time::Duration;

use serde::Serialize;

use crate::error::ProviderError;

/// One provider's answer to a prompt.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub text: String,
    /// Confidence in `[0, 1]` if the provider reports one; `None` means the
    /// aggregation stage must treat this completion as unranked.
    pub confidence: Option<f64>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), confidence: None }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// One call's outcome, carrying enough to reconstruct per-call latency,
/// success, and error for §8 testable-property assertions.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub provider_id: String,
    pub channel: u32,
    pub latency: Duration,
    pub result: Result<Completion, String>,
}

impl CallOutcome {
    pub fn success(provider_id: impl Into<String>, channel: u32, latency: Duration, completion: Completion) -> Self {
        Self { provider_id: provider_id.into(), channel, latency, result: Ok(completion) }
    }

    pub fn failure(provider_id: impl Into<String>, channel: u32, latency: Duration, error: &ProviderError) -> Self {
        Self { provider_id: provider_id.into(), channel, latency, result: Err(error.to_string()) }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
