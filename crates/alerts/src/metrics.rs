use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use bastion_core::{BreakerSnapshot, BreakerState, CacheHealth, ReconciliationSummary};
use bastion_gateway::Gateway;
use bastion_reconcile::ReconciliationEngine;

/// Snapshot that alert rules are evaluated against.
///
/// Component sections are optional so rules over a missing component simply
/// do not match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker: Option<BreakerSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationSummary>,
    /// Named numeric values: gateway counters plus caller-supplied extras.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, f64>,
}

impl AlertMetrics {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn breaker_open(&self) -> bool {
        self.breaker
            .as_ref()
            .is_some_and(|b| b.state == BreakerState::Open)
    }
}

/// Gathers a metrics snapshot for one monitor tick.
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    async fn collect(&self) -> AlertMetrics;
}

/// Collects gateway health, the latest reconciliation summary and extras.
pub struct GatewayCollector {
    gateway: Arc<Gateway>,
    reconcile: Option<Arc<ReconciliationEngine>>,
    extras: RwLock<BTreeMap<String, f64>>,
}

impl GatewayCollector {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            reconcile: None,
            extras: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn with_reconcile(mut self, engine: Arc<ReconciliationEngine>) -> Self {
        self.reconcile = Some(engine);
        self
    }

    /// Publish a caller-supplied value; replaces any previous value.
    pub fn set_extra(&self, name: impl Into<String>, value: f64) {
        self.extras.write().insert(name.into(), value);
    }
}

#[async_trait]
impl MetricsCollector for GatewayCollector {
    #[allow(clippy::cast_precision_loss)]
    async fn collect(&self) -> AlertMetrics {
        let health = self.gateway.health().await;

        let mut values: BTreeMap<String, f64> = health
            .metrics
            .counters()
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value as f64))
            .collect();
        values.extend(self.extras.read().iter().map(|(k, v)| (k.clone(), *v)));

        AlertMetrics {
            breaker: Some(health.breaker),
            cache: Some(health.cache),
            reconciliation: self.reconcile.as_ref().and_then(|e| e.last_summary()),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use bastion_gateway::GatewayBuilder;

    use super::*;

    #[tokio::test]
    async fn collects_gateway_health_and_extras() {
        let gateway = Arc::new(GatewayBuilder::new().build().unwrap());
        gateway.breaker().trip();
        let collector = GatewayCollector::new(gateway);
        collector.set_extra("queue_depth", 12.0);

        let metrics = collector.collect().await;
        assert!(metrics.breaker_open());
        assert_eq!(metrics.value("queue_depth"), Some(12.0));
        assert_eq!(metrics.value("calls"), Some(0.0));
        assert!(metrics.reconciliation.is_none());
        assert!(!metrics.cache.unwrap().distributed_configured);
    }
}
