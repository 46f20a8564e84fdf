use std::time::Duration;

use serde::Deserialize;

use bastion_gateway::CircuitBreakerConfig;

/// Configuration for the Registry circuit breaker.
///
/// # Example
///
/// ```toml
/// [circuit_breaker]
/// failure_threshold = 5
/// recovery_timeout_seconds = 30
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerServerConfig {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_cb_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a half-open probe is allowed.
    #[serde(default = "default_cb_recovery_timeout")]
    pub recovery_timeout_seconds: u64,
}

impl Default for CircuitBreakerServerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_cb_failure_threshold(),
            recovery_timeout_seconds: default_cb_recovery_timeout(),
        }
    }
}

impl CircuitBreakerServerConfig {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_seconds),
        }
    }
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_recovery_timeout() -> u64 {
    30
}
