//! Runtime-configurable AI backends (§3 ProviderDescriptor) and their
//! rate-limit/circuit-breaker parameters (§3 RateBucket / CircuitState).

use serde::{Deserialize, Serialize};

/// What a provider is capable of answering (§3, §6.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCapability {
    Generative,
    RegistryRu,
    RegistryKz,
}

/// Persisted provider configuration (§6.4). Loaded at startup, hot
/// reconfigurable; changes apply to the next request only (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Smaller sorts earlier; purely advisory outside of display ordering.
    pub priority: i32,
    pub capability: ProviderCapability,
    /// Parallel slot budget granted to this provider by the orchestrator.
    pub channels: u32,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ProviderDescriptor {
    pub fn generative(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            priority: 100,
            capability: ProviderCapability::Generative,
            channels: 1,
            api_key: None,
            base_url: None,
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Token-bucket parameters for one provider (§3 RateBucket, §4.C).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_second: 5.0, burst: 5 }
    }
}

/// Thresholds for the per-provider circuit breaker (§4.C).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, success_threshold: 2, cooldown_secs: 30 }
    }
}
