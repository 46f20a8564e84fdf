use std::time::Duration;

use serde::Deserialize;

use bastion_alerts::{AlertEngineConfig, AlertRule};

/// Configuration for the alert engine, its rules and its channels.
///
/// An empty `rules` list installs the built-in defaults.
///
/// # Example
///
/// ```toml
/// [alerts]
/// check_interval_seconds = 30
///
/// [[alerts.rules]]
/// id = "failing-upstream"
/// name = "Upstream failures"
/// severity = "high"
/// cooldown_seconds = 600
/// condition = { type = "metric_above", metric = "upstream_failures", threshold = 100.0 }
///
/// [alerts.channels.webhook]
/// url = "https://hooks.example.com/bastion"
/// secret = "signing-secret"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Service name carried in alert payloads.
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// Resolved alerts older than this are dropped.
    #[serde(default = "default_resolved_retention")]
    pub resolved_retention_seconds: u64,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            service: default_service(),
            check_interval_seconds: default_check_interval(),
            resolved_retention_seconds: default_resolved_retention(),
            rules: Vec::new(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl AlertsConfig {
    pub fn engine_config(&self) -> AlertEngineConfig {
        AlertEngineConfig {
            service: self.service.clone(),
            check_interval: Duration::from_secs(self.check_interval_seconds),
            resolved_retention: Duration::from_secs(self.resolved_retention_seconds),
        }
    }
}

/// Delivery channels. The console channel is on unless disabled.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_enabled")]
    pub console: bool,
    pub webhook: Option<WebhookChannelConfig>,
    pub email: Option<EmailChannelConfig>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            console: true,
            webhook: None,
            email: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChannelConfig {
    pub url: String,
    /// HMAC-SHA256 signing secret.
    pub secret: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailChannelConfig {
    pub from: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_service() -> String {
    "bastion".to_owned()
}

fn default_check_interval() -> u64 {
    30
}

fn default_resolved_retention() -> u64 {
    24 * 60 * 60
}

fn default_webhook_timeout() -> u64 {
    10
}
