use std::time::Duration;

use serde::Deserialize;

use bastion_gateway::IdempotencyConfig;

/// Configuration for write deduplication.
///
/// ```toml
/// [idempotency]
/// ttl_seconds = 3600
/// dedup_window_seconds = 60   # 0 disables content-derived keys
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyServerConfig {
    /// How long a stored first result is replayed.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Lifetime of the in-flight claim.
    #[serde(default = "default_in_flight_ttl")]
    pub in_flight_ttl_seconds: u64,
    /// How long a concurrent duplicate waits for the first caller's result.
    #[serde(default = "default_in_flight_wait_ms")]
    pub in_flight_wait_ms: u64,
    /// Window for deduplicating identical writes that carry no key header.
    #[serde(default = "default_dedup_window")]
    pub dedup_window_seconds: u64,
}

impl Default for IdempotencyServerConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            in_flight_ttl_seconds: default_in_flight_ttl(),
            in_flight_wait_ms: default_in_flight_wait_ms(),
            dedup_window_seconds: default_dedup_window(),
        }
    }
}

impl IdempotencyServerConfig {
    pub fn idempotency_config(&self) -> IdempotencyConfig {
        IdempotencyConfig {
            default_ttl: Duration::from_secs(self.ttl_seconds),
            in_flight_ttl: Duration::from_secs(self.in_flight_ttl_seconds),
            in_flight_wait: Duration::from_millis(self.in_flight_wait_ms),
            ..IdempotencyConfig::default()
        }
    }

    pub fn dedup_window(&self) -> Option<Duration> {
        (self.dedup_window_seconds > 0).then(|| Duration::from_secs(self.dedup_window_seconds))
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_in_flight_ttl() -> u64 {
    60
}

fn default_in_flight_wait_ms() -> u64 {
    5000
}

fn default_dedup_window() -> u64 {
    60
}
