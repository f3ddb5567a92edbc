//! Environment-loaded configuration (§9 "reflective configuration") plus
//! the CLI surface and exit codes of §6.5.

use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use refnorm_models::{CircuitBreakerConfig, RateLimitConfig};

/// Process exit codes (§6.5), returned from `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Clean = 0,
    ConfigError = 1,
    StartupFailure = 2,
    ShutdownWithLiveJobs = 3,
}

/// `--config`/env-var surface for the binary. Values loaded here only
/// seed process-wide defaults; `ProviderDescriptor`s are reconfigured
/// through the data-access layer, never through environment variables.
#[derive(Debug, Parser)]
#[command(name = "refnorm-engine", about = "Reference-data normalization engine")]
pub struct Cli {
    /// Optional `.env`-style file to load before reading the environment.
    #[arg(long, env = "REFNORM_CONFIG_PATH")]
    pub config: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Administrator-configured ceiling on concurrent workers; the
    /// scheduler further caps this by the active provider's channel
    /// count at fan-in (§4.H).
    pub global_worker_budget: usize,
    pub default_rate_limit: RateLimitConfig,
    pub default_circuit_breaker: CircuitBreakerConfig,
    pub event_bus_capacity: usize,
    pub result_batch_size: usize,
    pub sweeper_interval_secs: u64,
    pub default_session_timeout_secs: u64,
    /// `K` in §4.G step 8: emit an incremental progress event every this
    /// many items processed during clustering.
    pub progress_increment: u64,
    /// Similarity threshold for the single-pass clustering stage (§4.G.4).
    pub cluster_threshold: f64,
    pub classifier_confidence_threshold: f64,
    /// Deadline the scheduler waits for workers to finish on shutdown
    /// before force-failing their sessions (§5).
    pub shutdown_deadline_secs: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

impl Config {
    /// Loads configuration from environment variables, applying the
    /// defaults documented per-field above when a variable is unset.
    /// Malformed (but present) values are a hard config error (exit 1).
    pub fn from_env() -> Result<Self, ConfigError> {
        let host: IpAddr = env_or("REFNORM_BIND_HOST", "0.0.0.0")?;
        let port: u16 = env_or("REFNORM_BIND_PORT", "8080")?;

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            global_worker_budget: env_or("REFNORM_WORKER_BUDGET", "8")?,
            default_rate_limit: RateLimitConfig {
                requests_per_second: env_or("REFNORM_RATE_LIMIT_RPS", "5.0")?,
                burst: env_or("REFNORM_RATE_LIMIT_BURST", "5")?,
            },
            default_circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_or("REFNORM_BREAKER_FAILURE_THRESHOLD", "5")?,
                success_threshold: env_or("REFNORM_BREAKER_SUCCESS_THRESHOLD", "2")?,
                cooldown_secs: env_or("REFNORM_BREAKER_COOLDOWN_SECS", "30")?,
            },
            event_bus_capacity: env_or("REFNORM_EVENT_BUS_CAPACITY", "1024")?,
            result_batch_size: env_or("REFNORM_RESULT_BATCH_SIZE", "500")?,
            sweeper_interval_secs: env_or("REFNORM_SWEEPER_INTERVAL_SECS", "60")?,
            default_session_timeout_secs: env_or("REFNORM_SESSION_TIMEOUT_SECS", "300")?,
            progress_increment: env_or("REFNORM_PROGRESS_INCREMENT", "50")?,
            cluster_threshold: env_or("REFNORM_CLUSTER_THRESHOLD", "0.85")?,
            classifier_confidence_threshold: env_or("REFNORM_CLASSIFIER_CONFIDENCE_THRESHOLD", "0.6")?,
            shutdown_deadline_secs: env_or("REFNORM_SHUTDOWN_DEADLINE_SECS", "30")?,
        })
    }
}

fn env_or<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>().map_err(|e| ConfigError(format!("{key}={raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_any_env_vars_set() {
        // Each default literal above must itself be valid for its field type.
        let rps: f64 = env_or("REFNORM_RATE_LIMIT_RPS_TEST_UNSET", "5.0").unwrap();
        assert_eq!(rps, 5.0);
    }

    #[test]
    fn malformed_value_is_a_config_error() {
        std::env::set_var("REFNORM_TEST_MALFORMED_PORT", "not-a-number");
        let result: Result<u16, ConfigError> = env_or("REFNORM_TEST_MALFORMED_PORT", "8080");
        std::env::remove_var("REFNORM_TEST_MALFORMED_PORT");
        assert!(result.is_err());
    }
}
