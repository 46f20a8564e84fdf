use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use bastion_alerts::{
    AlertEngine, AlertMonitor, ConsoleChannel, EmailChannel, GatewayCollector, MetricsCollector,
    WebhookChannel, default_rules,
};
use bastion_cache::TieredCache;
use bastion_core::AgentFilter;
use bastion_gateway::{
    CircuitBreaker, Gateway, GatewayBuilder, GatewayError, REGISTRY_BREAKER, Scheduler,
};
use bastion_reconcile::{
    ReconciliationEngine, ReconciliationResult, StaticSource, SupplementalSource,
};

use crate::config::{AlertsConfig, BastionConfig};
use crate::error::ServerError;
use crate::registry_client::HttpRegistryClient;
use crate::store_factory::create_store;
use crate::supplemental::HttpSupplementalSource;

/// Cache key holding the last reconciled agent list.
pub const RECONCILED_AGENTS_KEY: &str = "agents:reconciled";

/// The wired Bastion service.
///
/// All background loops (cache cleanup, reconciliation, alert monitor) run
/// on one [`Scheduler`] shared with the gateway.
pub struct App {
    config: BastionConfig,
    gateway: Arc<Gateway>,
    reconciler: Arc<ReconciliationEngine>,
    alerts: Arc<AlertEngine>,
    collector: Arc<GatewayCollector>,
    scheduler: Scheduler,
}

impl App {
    /// Validate `config` and wire store, cache, breaker, gateway,
    /// reconciliation and alerting. Nothing runs until [`start`](Self::start).
    pub fn build(config: BastionConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let store = create_store(&config.cache)?;
        let cache = Arc::new(TieredCache::new(config.cache.tiered_config(), store));
        let breaker = Arc::new(CircuitBreaker::new(
            REGISTRY_BREAKER,
            config.circuit_breaker.breaker_config(),
        ));

        let mut registry = HttpRegistryClient::new(
            &config.registry.base_url,
            Duration::from_secs(config.registry.timeout_seconds),
        )?;
        if let Some(token) = &config.registry.token {
            registry = registry.with_token(token);
        }

        let scheduler = Scheduler::new();
        let gateway = Arc::new(
            GatewayBuilder::new()
                .registry(Arc::new(registry))
                .cache(cache)
                .breaker(breaker)
                .idempotency_config(config.idempotency.idempotency_config())
                .authenticator(Arc::new(config.auth.authenticator()))
                .scheduler(scheduler.clone())
                .config(config.gateway_config())
                .build()?,
        );

        let reconcile_config = config.reconcile.reconcile_config();
        let source: Arc<dyn SupplementalSource> = match &config.supplemental.url {
            Some(url) => {
                let mut source = HttpSupplementalSource::new(url, reconcile_config.fetch_timeout)?;
                if let Some(token) = &config.supplemental.token {
                    source = source.with_token(token);
                }
                Arc::new(source)
            }
            None => Arc::new(StaticSource::default()),
        };
        let reconciler = Arc::new(ReconciliationEngine::new(source, reconcile_config));

        let alerts = Arc::new(build_alert_engine(&config.alerts)?);
        let collector = Arc::new(
            GatewayCollector::new(Arc::clone(&gateway)).with_reconcile(Arc::clone(&reconciler)),
        );

        Ok(Self {
            config,
            gateway,
            reconciler,
            alerts,
            collector,
            scheduler,
        })
    }

    /// Spawn every enabled background loop.
    pub fn start(&self) {
        self.gateway.start_cache_cleanup();

        if self.config.reconcile.enabled {
            let gateway = Arc::clone(&self.gateway);
            let reconciler = Arc::clone(&self.reconciler);
            let period = Duration::from_secs(self.config.reconcile.interval_seconds);
            self.scheduler.spawn_periodic("reconcile", period, move || {
                let gateway = Arc::clone(&gateway);
                let reconciler = Arc::clone(&reconciler);
                async move {
                    if let Err(e) = reconcile_once(&gateway, &reconciler).await {
                        warn!(error = %e, "reconciliation pass skipped");
                    }
                }
            });
        }

        if self.config.alerts.enabled {
            let collector: Arc<dyn MetricsCollector> = self.collector.clone();
            AlertMonitor::start(&self.scheduler, Arc::clone(&self.alerts), collector);
        }

        info!(
            registry = %self.config.registry.base_url,
            cache_backend = %self.config.cache.backend,
            reconcile = self.config.reconcile.enabled,
            alerts = self.config.alerts.enabled,
            "bastion started"
        );
    }

    /// Start, wait for Ctrl-C, then shut down.
    pub async fn run_until_shutdown(self) {
        self.start();
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        self.shutdown().await;
    }

    /// Stop every background loop and drain pending audit records.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.gateway.shutdown().await;
    }

    /// Run one reconciliation pass now.
    pub async fn reconcile_now(&self) -> Result<ReconciliationResult, GatewayError> {
        reconcile_once(&self.gateway, &self.reconciler).await
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn reconciler(&self) -> &Arc<ReconciliationEngine> {
        &self.reconciler
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &BastionConfig {
        &self.config
    }
}

/// Fetch agents through the gateway, reconcile them and cache the merged
/// list under [`RECONCILED_AGENTS_KEY`].
pub async fn reconcile_once(
    gateway: &Gateway,
    reconciler: &ReconciliationEngine,
) -> Result<ReconciliationResult, GatewayError> {
    let agents = gateway.get_agents(&AgentFilter::default()).await?;
    let result = reconciler.reconcile(agents).await;
    gateway
        .cache()
        .set(
            RECONCILED_AGENTS_KEY,
            &result.records,
            Some(gateway.config().read_ttl),
        )
        .await;
    Ok(result)
}

fn build_alert_engine(config: &AlertsConfig) -> Result<AlertEngine, ServerError> {
    let rules = if config.rules.is_empty() {
        default_rules()
    } else {
        config.rules.clone()
    };
    let mut engine = AlertEngine::new(config.engine_config()).with_rules(rules)?;

    let channels = &config.channels;
    if channels.console {
        engine = engine.with_channel(Arc::new(ConsoleChannel::new()));
    }
    if let Some(webhook) = &channels.webhook {
        let mut channel = WebhookChannel::new(
            &webhook.url,
            &config.service,
            Duration::from_secs(webhook.timeout_seconds),
        )?;
        if let Some(secret) = &webhook.secret {
            channel = channel.with_secret(secret);
        }
        engine = engine.with_channel(Arc::new(channel));
    }
    if let Some(email) = &channels.email {
        engine = engine.with_channel(Arc::new(EmailChannel::new(
            &email.from,
            email.recipients.clone(),
        )));
    }
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alert_engine_has_default_rules_and_console() {
        let engine = build_alert_engine(&AlertsConfig::default()).unwrap();
        let ids: Vec<String> = engine.rules().into_iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            [
                "breaker-open",
                "cache-down",
                "supplemental-unavailable",
                "reconcile-conflicts"
            ]
        );
    }

    #[test]
    fn invalid_webhook_url_fails_the_build() {
        let mut config = AlertsConfig::default();
        config.channels.webhook = Some(crate::config::WebhookChannelConfig {
            url: "hooks.example.com".into(),
            secret: None,
            timeout_seconds: 5,
        });
        assert!(matches!(
            build_alert_engine(&config),
            Err(ServerError::Channel(_))
        ));
    }
}
