mod alerts;
mod auth;
mod cache;
mod circuit_breaker;
mod idempotency;
mod reconcile;
mod registry;
mod supplemental;
mod telemetry;


pub use alerts::*;
pub use auth::*;
pub use cache::*;
pub use circuit_breaker::*;
pub use idempotency::*;
pub use reconcile::*;
pub use registry::*;
pub use supplemental::*;
pub use telemetry::*;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use bastion_gateway::GatewayConfig;

use crate::error::ConfigError;

/// Top-level configuration for the Bastion binary, loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BastionConfig {
    /// Upstream Registry connection.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Supplemental data source used by reconciliation.
    #[serde(default)]
    pub supplemental: SupplementalConfig,
    /// Registry circuit breaker.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerServerConfig,
    /// Tiered cache and distributed backend.
    #[serde(default)]
    pub cache: CacheServerConfig,
    /// Write deduplication.
    #[serde(default)]
    pub idempotency: IdempotencyServerConfig,
    /// Periodic reconciliation.
    #[serde(default)]
    pub reconcile: ReconcileServerConfig,
    /// Alert rules and channels.
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// API keys for authenticated calls.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Log output.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BastionConfig {
    /// Load from `path`; a missing file yields all defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(toml::from_str("")?);
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Gateway settings assembled from the `[registry]`, `[cache]` and
    /// `[idempotency]` sections.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            read_ttl: Duration::from_secs(self.cache.read_ttl_seconds),
            call_timeout: Duration::from_secs(self.registry.timeout_seconds),
            cleanup_interval: Duration::from_secs(self.cache.cleanup_interval_seconds),
            dedup_window: self.idempotency.dedup_window(),
        }
    }

    /// Reject values that would only fail later at wiring or run time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.registry.base_url) {
            return Err(invalid("registry", "base_url must be an http(s) URL"));
        }
        if self.registry.timeout_seconds == 0 {
            return Err(invalid("registry", "timeout_seconds must be greater than zero"));
        }
        if let Some(url) = &self.supplemental.url
            && !is_http_url(url)
        {
            return Err(invalid("supplemental", "url must be an http(s) URL"));
        }

        self.circuit_breaker
            .breaker_config()
            .validate()
            .map_err(|reason| invalid("circuit_breaker", reason))?;

        match self.cache.backend.as_str() {
            "memory" | "none" => {}
            "redis" if self.cache.url.is_none() => {
                return Err(invalid("cache", "backend \"redis\" requires url"));
            }
            "redis" => {}
            other => {
                return Err(invalid(
                    "cache",
                    format!("unknown backend \"{other}\" (expected memory, redis or none)"),
                ));
            }
        }
        if self.cache.cleanup_interval_seconds == 0 {
            return Err(invalid("cache", "cleanup_interval_seconds must be greater than zero"));
        }

        if self.idempotency.ttl_seconds == 0 || self.idempotency.in_flight_ttl_seconds == 0 {
            return Err(invalid("idempotency", "ttls must be greater than zero"));
        }

        self.reconcile
            .reconcile_config()
            .validate()
            .map_err(|reason| invalid("reconcile", reason))?;
        if self.reconcile.enabled && self.reconcile.interval_seconds == 0 {
            return Err(invalid("reconcile", "interval_seconds must be greater than zero"));
        }

        self.validate_alerts()?;

        match self.telemetry.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(invalid(
                "telemetry",
                format!("unknown format \"{other}\" (expected pretty or json)"),
            )),
        }
    }

    fn validate_alerts(&self) -> Result<(), ConfigError> {
        let alerts = &self.alerts;
        if alerts.enabled && alerts.check_interval_seconds == 0 {
            return Err(invalid("alerts", "check_interval_seconds must be greater than zero"));
        }
        let mut seen = std::collections::HashSet::new();
        for rule in &alerts.rules {
            rule.validate()
                .map_err(|e| invalid("alerts", e.to_string()))?;
            if !seen.insert(rule.id.as_str()) {
                return Err(invalid("alerts", format!("duplicate rule id \"{}\"", rule.id)));
            }
        }
        if let Some(webhook) = &alerts.channels.webhook
            && !is_http_url(&webhook.url)
        {
            return Err(invalid("alerts", "webhook url must be an http(s) URL"));
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn invalid(section: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section,
        reason: reason.into(),
    }
}
