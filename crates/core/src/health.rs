use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Effective state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation: calls flow through.
    Closed,
    /// Upstream is failing: calls are rejected immediately.
    Open,
    /// Recovery probe: a single trial call is in flight.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_time: Option<DateTime<Utc>>,
}

/// Health of both cache tiers, reported separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHealth {
    /// Whether a distributed store is configured at all.
    pub distributed_configured: bool,
    /// Whether the distributed store answered a ping.
    pub distributed_reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributed_error: Option<String>,
    /// Live entries in the in-process fallback map.
    pub fallback_entries: usize,
}

/// Outcome counts of the latest reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub total: usize,
    pub merged: usize,
    pub registry_only: usize,
    pub fallback: usize,
    pub conflicts: usize,
    pub supplemental_data_available: bool,
    pub timestamp: DateTime<Utc>,
}
