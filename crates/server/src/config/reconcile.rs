use std::time::Duration;

use serde::Deserialize;

use bastion_reconcile::{ReconcileConfig, ResolutionPolicy};

/// Configuration for the periodic reconciliation job.
///
/// # Example
///
/// ```toml
/// [reconcile]
/// interval_seconds = 300
/// fetch_timeout_seconds = 10
///
/// [reconcile.policy]
/// status = "merge"
/// creation_count = "merge"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileServerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    /// Per-field conflict resolution.
    #[serde(default)]
    pub policy: ResolutionPolicy,
}

impl Default for ReconcileServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_seconds: default_interval(),
            fetch_timeout_seconds: default_fetch_timeout(),
            policy: ResolutionPolicy::default(),
        }
    }
}

impl ReconcileServerConfig {
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_seconds),
            policy: self.policy,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_fetch_timeout() -> u64 {
    10
}
