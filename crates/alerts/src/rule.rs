use serde::{Deserialize, Serialize};

use crate::alert::Severity;
use crate::error::AlertError;
use crate::metrics::AlertMetrics;

/// Closed set of alert conditions, evaluated by [`RuleCondition::evaluate`].
///
/// Conditions over a component absent from the snapshot evaluate to `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// The Registry circuit breaker is open.
    BreakerOpen,
    /// The breaker has recorded at least `count` consecutive failures.
    BreakerFailuresAtLeast { count: u32 },
    /// A distributed cache is configured but did not answer its ping.
    DistributedCacheDown,
    /// The in-process fallback cache holds more than `count` entries.
    FallbackEntriesAbove { count: usize },
    /// The last reconciliation pass could not reach the supplemental source.
    SupplementalUnavailable,
    /// The last reconciliation pass found more than `count` conflicts.
    ConflictsAbove { count: usize },
    /// A named value is strictly above `threshold`.
    MetricAbove { metric: String, threshold: f64 },
    /// A named value is strictly below `threshold`.
    MetricBelow { metric: String, threshold: f64 },
    All { conditions: Vec<RuleCondition> },
    Any { conditions: Vec<RuleCondition> },
    Not { condition: Box<RuleCondition> },
}

impl RuleCondition {
    pub fn evaluate(&self, metrics: &AlertMetrics) -> bool {
        match self {
            Self::BreakerOpen => metrics.breaker_open(),
            Self::BreakerFailuresAtLeast { count } => metrics
                .breaker
                .as_ref()
                .is_some_and(|b| b.failure_count >= *count),
            Self::DistributedCacheDown => metrics
                .cache
                .as_ref()
                .is_some_and(|c| c.distributed_configured && !c.distributed_reachable),
            Self::FallbackEntriesAbove { count } => metrics
                .cache
                .as_ref()
                .is_some_and(|c| c.fallback_entries > *count),
            Self::SupplementalUnavailable => metrics
                .reconciliation
                .as_ref()
                .is_some_and(|r| !r.supplemental_data_available),
            Self::ConflictsAbove { count } => metrics
                .reconciliation
                .as_ref()
                .is_some_and(|r| r.conflicts > *count),
            Self::MetricAbove { metric, threshold } => {
                metrics.value(metric).is_some_and(|v| v > *threshold)
            }
            Self::MetricBelow { metric, threshold } => {
                metrics.value(metric).is_some_and(|v| v < *threshold)
            }
            Self::All { conditions } => conditions.iter().all(|c| c.evaluate(metrics)),
            Self::Any { conditions } => conditions.iter().any(|c| c.evaluate(metrics)),
            Self::Not { condition } => !condition.evaluate(metrics),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// A named condition with a severity and a cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub condition: RuleCondition,
    pub severity: Severity,
    /// Minimum seconds between two firings of this rule.
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Alert message; the rule name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition: RuleCondition,
        severity: Severity,
        cooldown_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            condition,
            severity,
            cooldown_seconds,
            enabled: true,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(&self.name)
    }

    pub fn validate(&self) -> Result<(), AlertError> {
        let invalid = |reason: &str| AlertError::InvalidRule {
            id: self.id.clone(),
            reason: reason.to_owned(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        Ok(())
    }
}

/// Rules installed when configuration supplies none.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "breaker-open",
            "Registry circuit breaker open",
            RuleCondition::BreakerOpen,
            Severity::Critical,
            300,
        )
        .with_message("Registry circuit breaker is open; calls are failing fast"),
        AlertRule::new(
            "cache-down",
            "Distributed cache unreachable",
            RuleCondition::DistributedCacheDown,
            Severity::High,
            600,
        )
        .with_message("Distributed cache is unreachable; serving from the in-process fallback"),
        AlertRule::new(
            "supplemental-unavailable",
            "Supplemental source unavailable",
            RuleCondition::SupplementalUnavailable,
            Severity::Medium,
            900,
        )
        .with_message("Supplemental data source is unavailable; records carry fallback provenance"),
        AlertRule::new(
            "reconcile-conflicts",
            "Reconciliation conflicts above 10",
            RuleCondition::ConflictsAbove { count: 10 },
            Severity::Low,
            3600,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use bastion_core::{BreakerSnapshot, BreakerState, CacheHealth, ReconciliationSummary};

    use super::*;

    fn breaker(state: BreakerState, failures: u32) -> BreakerSnapshot {
        BreakerSnapshot {
            name: "registry".into(),
            state,
            failure_count: failures,
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            last_failure_time: None,
            next_retry_time: None,
        }
    }

    fn summary(available: bool, conflicts: usize) -> ReconciliationSummary {
        ReconciliationSummary {
            total: 20,
            merged: 10,
            registry_only: 10,
            fallback: 0,
            conflicts,
            supplemental_data_available: available,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn component_conditions() {
        let metrics = AlertMetrics {
            breaker: Some(breaker(BreakerState::Open, 5)),
            cache: Some(CacheHealth {
                distributed_configured: true,
                distributed_reachable: false,
                distributed_error: Some("refused".into()),
                fallback_entries: 3,
            }),
            reconciliation: Some(summary(false, 11)),
            ..AlertMetrics::default()
        };

        assert!(RuleCondition::BreakerOpen.evaluate(&metrics));
        assert!(RuleCondition::BreakerFailuresAtLeast { count: 5 }.evaluate(&metrics));
        assert!(!RuleCondition::BreakerFailuresAtLeast { count: 6 }.evaluate(&metrics));
        assert!(RuleCondition::DistributedCacheDown.evaluate(&metrics));
        assert!(RuleCondition::FallbackEntriesAbove { count: 2 }.evaluate(&metrics));
        assert!(!RuleCondition::FallbackEntriesAbove { count: 3 }.evaluate(&metrics));
        assert!(RuleCondition::SupplementalUnavailable.evaluate(&metrics));
        assert!(RuleCondition::ConflictsAbove { count: 10 }.evaluate(&metrics));
    }

    #[test]
    fn missing_components_never_match() {
        let empty = AlertMetrics::default();
        for rule in default_rules() {
            assert!(!rule.condition.evaluate(&empty), "{}", rule.id);
        }
        assert!(
            !RuleCondition::MetricAbove {
                metric: "calls".into(),
                threshold: 0.0
            }
            .evaluate(&empty)
        );
    }

    #[test]
    fn unconfigured_cache_is_not_down() {
        let metrics = AlertMetrics {
            cache: Some(CacheHealth::default()),
            ..AlertMetrics::default()
        };
        assert!(!RuleCondition::DistributedCacheDown.evaluate(&metrics));
    }

    #[test]
    fn combinators_and_thresholds() {
        let metrics = AlertMetrics::default()
            .with_value("upstream_failures", 12.0)
            .with_value("cache_hits", 1.0);
        let failing = RuleCondition::MetricAbove {
            metric: "upstream_failures".into(),
            threshold: 10.0,
        };
        let cold = RuleCondition::MetricBelow {
            metric: "cache_hits".into(),
            threshold: 5.0,
        };

        assert!(
            RuleCondition::All {
                conditions: vec![failing.clone(), cold.clone()]
            }
            .evaluate(&metrics)
        );
        assert!(
            RuleCondition::Any {
                conditions: vec![RuleCondition::BreakerOpen, cold]
            }
            .evaluate(&metrics)
        );
        assert!(
            !RuleCondition::Not {
                condition: Box::new(failing)
            }
            .evaluate(&metrics)
        );
    }

    #[test]
    fn rules_load_from_toml() {
        let raw = r#"
            [[rules]]
            id = "slow-upstream"
            name = "Upstream failing"
            severity = "high"
            cooldown_seconds = 120

            [rules.condition]
            type = "any"
            conditions = [
                { type = "breaker_open" },
                { type = "metric_above", metric = "upstream_failures", threshold = 50.0 },
            ]
        "#;

        #[derive(Deserialize)]
        struct File {
            rules: Vec<AlertRule>,
        }

        let file: File = toml::from_str(raw).unwrap();
        let rule = &file.rules[0];
        assert!(rule.enabled);
        assert_eq!(rule.severity, Severity::High);
        assert_eq!(rule.message(), "Upstream failing");
        assert!(matches!(rule.condition, RuleCondition::Any { ref conditions } if conditions.len() == 2));
    }

    #[test]
    fn validation_rejects_blank_fields() {
        let rule = AlertRule::new("", "x", RuleCondition::BreakerOpen, Severity::Low, 0);
        assert!(rule.validate().is_err());
        let rule = AlertRule::new("x", " ", RuleCondition::BreakerOpen, Severity::Low, 0);
        assert!(rule.validate().is_err());
        assert!(default_rules().iter().all(|r| r.validate().is_ok()));
    }
}
