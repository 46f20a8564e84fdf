use std::sync::Arc;

use tokio_util::task::TaskTracker;

use bastion_audit::{AuditSink, LogAuditSink};
use bastion_cache::{TieredCache, TieredCacheConfig};
use bastion_core::{RegistryClient, SharedClock, system_clock};

use crate::auth::Authenticator;
use crate::background::Scheduler;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::GatewayError;
use crate::gateway::{Gateway, GatewayConfig};
use crate::idempotency::{IdempotencyConfig, IdempotencyManager};
use crate::metrics::GatewayMetrics;

/// Name of the breaker guarding the Registry.
pub const REGISTRY_BREAKER: &str = "registry";

/// Fluent builder for constructing a [`Gateway`] instance.
///
/// Nothing is required. Without a cache the gateway runs on a local-only
/// [`TieredCache`]; without an audit sink records go to the log; without a
/// registry client only [`Gateway::call`] and [`Gateway::call_write`] work.
pub struct GatewayBuilder {
    registry: Option<Arc<dyn RegistryClient>>,
    cache: Option<Arc<TieredCache>>,
    breaker: Option<Arc<CircuitBreaker>>,
    breaker_config: CircuitBreakerConfig,
    idempotency_config: IdempotencyConfig,
    authenticator: Option<Arc<dyn Authenticator>>,
    audit: Option<Arc<dyn AuditSink>>,
    metrics: Option<Arc<GatewayMetrics>>,
    scheduler: Option<Scheduler>,
    clock: SharedClock,
    config: GatewayConfig,
}

impl GatewayBuilder {
    /// Create a new builder with all optional fields set to their defaults.
    pub fn new() -> Self {
        Self {
            registry: None,
            cache: None,
            breaker: None,
            breaker_config: CircuitBreakerConfig::default(),
            idempotency_config: IdempotencyConfig::default(),
            authenticator: None,
            audit: None,
            metrics: None,
            scheduler: None,
            clock: system_clock(),
            config: GatewayConfig::default(),
        }
    }

    /// Set the upstream Registry client.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share an existing cache. Its clock is left untouched.
    #[must_use]
    pub fn cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an existing breaker, e.g. one an alert collector also reads.
    #[must_use]
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Configure the breaker the builder creates. Ignored with [`Self::breaker`].
    #[must_use]
    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    #[must_use]
    pub fn idempotency_config(mut self, config: IdempotencyConfig) -> Self {
        self.idempotency_config = config;
        self
    }

    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Set the audit sink. Records are sent fire-and-forget.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run background loops on a shared scheduler.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Clock for the breaker, audit timestamps and the default cache.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Consume the builder and produce a configured [`Gateway`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotConfigured`] if the breaker configuration
    /// is invalid.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let breaker = match self.breaker {
            Some(breaker) => breaker,
            None => {
                self.breaker_config
                    .validate()
                    .map_err(|e| GatewayError::NotConfigured(format!("circuit breaker: {e}")))?;
                Arc::new(
                    CircuitBreaker::new(REGISTRY_BREAKER, self.breaker_config)
                        .with_clock(Arc::clone(&self.clock)),
                )
            }
        };

        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(
                TieredCache::new(TieredCacheConfig::default(), None)
                    .with_clock(Arc::clone(&self.clock)),
            )
        });

        let idempotency = IdempotencyManager::new(Arc::clone(&cache), self.idempotency_config);

        Ok(Gateway {
            registry: self.registry,
            breaker,
            cache,
            idempotency,
            authenticator: self.authenticator,
            audit: self.audit.unwrap_or_else(|| Arc::new(LogAuditSink)),
            audit_tracker: TaskTracker::new(),
            metrics: self.metrics.unwrap_or_default(),
            scheduler: self.scheduler.unwrap_or_default(),
            clock: self.clock,
            config: self.config,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bastion_core::BreakerState;

    use super::*;

    #[test]
    fn defaults_build() {
        let gw = GatewayBuilder::new().build().unwrap();
        assert_eq!(gw.breaker().name(), REGISTRY_BREAKER);
        assert!(!gw.cache().has_distributed_tier());
    }

    #[test]
    fn invalid_breaker_config_is_rejected() {
        let err = GatewayBuilder::new()
            .breaker_config(CircuitBreakerConfig {
                failure_threshold: 0,
                recovery_timeout: Duration::from_secs(1),
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured(_)));
    }

    #[test]
    fn shared_breaker_is_used() {
        let breaker = Arc::new(CircuitBreaker::new("shared", CircuitBreakerConfig::default()));
        breaker.trip();
        let gw = GatewayBuilder::new().breaker(breaker.clone()).build().unwrap();
        assert_eq!(gw.breaker().name(), "shared");
        assert_eq!(gw.breaker().state(), BreakerState::Open);
    }
}
