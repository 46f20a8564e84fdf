use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters tracking gateway call outcomes.
///
/// All counters use relaxed ordering. For a point-in-time view, call
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Every gateway invocation, whatever its outcome.
    pub calls: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Upstream calls that returned successfully.
    pub upstream_successes: AtomicU64,
    /// Upstream calls that failed or timed out.
    pub upstream_failures: AtomicU64,
    /// Calls rejected because the circuit breaker was open.
    pub circuit_open: AtomicU64,
    /// Circuit breaker state transitions (any direction).
    pub circuit_transitions: AtomicU64,
    pub auth_failures: AtomicU64,
    /// Writes answered from a stored idempotency record.
    pub idempotent_replays: AtomicU64,
    /// Cache keys removed by write-triggered invalidation.
    pub invalidated_keys: AtomicU64,
}

impl GatewayMetrics {
    pub fn increment_calls(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_upstream_successes(&self) {
        self.upstream_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_upstream_failures(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_circuit_open(&self) {
        self.circuit_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_circuit_transitions(&self) {
        self.circuit_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_idempotent_replays(&self) {
        self.idempotent_replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_invalidated_keys(&self, n: usize) {
        self.invalidated_keys
            .fetch_add(u64::try_from(n).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_successes: self.upstream_successes.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            circuit_open: self.circuit_open.load(Ordering::Relaxed),
            circuit_transitions: self.circuit_transitions.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            idempotent_replays: self.idempotent_replays.load(Ordering::Relaxed),
            invalidated_keys: self.invalidated_keys.load(Ordering::Relaxed),
        }
    }
}

/// Serializable point-in-time view of [`GatewayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_successes: u64,
    pub upstream_failures: u64,
    pub circuit_open: u64,
    pub circuit_transitions: u64,
    pub auth_failures: u64,
    pub idempotent_replays: u64,
    pub invalidated_keys: u64,
}

impl MetricsSnapshot {
    /// Counters as `(name, value)` pairs, in declaration order.
    pub fn counters(&self) -> [(&'static str, u64); 10] {
        [
            ("calls", self.calls),
            ("cache_hits", self.cache_hits),
            ("cache_misses", self.cache_misses),
            ("upstream_successes", self.upstream_successes),
            ("upstream_failures", self.upstream_failures),
            ("circuit_open", self.circuit_open),
            ("circuit_transitions", self.circuit_transitions),
            ("auth_failures", self.auth_failures),
            ("idempotent_replays", self.idempotent_replays),
            ("invalidated_keys", self.invalidated_keys),
        ]
    }
}
