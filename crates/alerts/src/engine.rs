use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use bastion_core::{Clock, SharedClock, system_clock};

use crate::alert::{Alert, Severity};
use crate::channel::AlertChannel;
use crate::error::AlertError;
use crate::metrics::AlertMetrics;
use crate::rule::AlertRule;

/// Alert engine settings.
#[derive(Debug, Clone)]
pub struct AlertEngineConfig {
    /// Service name carried in webhook envelopes and logs.
    pub service: String,
    /// Monitor tick period.
    pub check_interval: Duration,
    /// Resolved alerts older than this are pruned on every monitor tick.
    pub resolved_retention: Duration,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            service: "bastion".into(),
            check_interval: Duration::from_secs(30),
            resolved_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Per-channel outcome of dispatching one alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub alert_id: String,
    pub delivered: Vec<String>,
    /// `(channel, error)` pairs.
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Evaluates alert rules under per-rule cooldowns and dispatches alerts.
///
/// Fired and submitted alerts are retained until resolved; resolved alerts
/// are dropped by [`prune_resolved`](Self::prune_resolved).
pub struct AlertEngine {
    rules: RwLock<Vec<AlertRule>>,
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
    alerts: RwLock<Vec<Alert>>,
    channels: Vec<Arc<dyn AlertChannel>>,
    clock: SharedClock,
    config: AlertEngineConfig,
}

impl AlertEngine {
    pub fn new(config: AlertEngineConfig) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            last_fired: Mutex::new(HashMap::new()),
            alerts: RwLock::new(Vec::new()),
            channels: Vec::new(),
            clock: system_clock(),
            config,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn AlertChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Install `rules`, rejecting invalid rules and duplicate ids.
    pub fn with_rules(self, rules: Vec<AlertRule>) -> Result<Self, AlertError> {
        for rule in rules {
            self.add_rule(rule)?;
        }
        Ok(self)
    }

    pub fn config(&self) -> &AlertEngineConfig {
        &self.config
    }

    pub fn add_rule(&self, rule: AlertRule) -> Result<(), AlertError> {
        rule.validate()?;
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(AlertError::DuplicateRule(rule.id));
        }
        debug!(rule = %rule.id, "alert rule added");
        rules.push(rule);
        Ok(())
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        self.last_fired.lock().remove(id);
        rules.len() != before
    }

    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> bool {
        self.rules
            .write()
            .iter_mut()
            .find(|r| r.id == id)
            .map(|r| r.enabled = enabled)
            .is_some()
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().clone()
    }

    /// Fire every enabled rule whose condition holds and whose cooldown has
    /// elapsed. Fired alerts are stored and returned but not dispatched.
    pub fn evaluate(&self, metrics: &AlertMetrics) -> Vec<Alert> {
        let now = self.clock.now();
        let rules = self.rules.read();
        let mut last_fired = self.last_fired.lock();

        let mut fired = Vec::new();
        for rule in rules.iter().filter(|r| r.enabled) {
            if !rule.condition.evaluate(metrics) {
                continue;
            }
            let cooldown = chrono::Duration::seconds(
                i64::try_from(rule.cooldown_seconds).unwrap_or(i64::MAX),
            );
            if let Some(last) = last_fired.get(&rule.id) {
                if now.signed_duration_since(*last) < cooldown {
                    debug!(rule = %rule.id, "alert suppressed by cooldown");
                    continue;
                }
            }
            last_fired.insert(rule.id.clone(), now);
            info!(rule = %rule.id, severity = %rule.severity, "alert rule fired");
            fired.push(Alert::new(
                Some(rule.id.clone()),
                rule.severity,
                rule.message(),
                metrics.clone(),
                now,
            ));
        }
        drop(last_fired);
        drop(rules);

        if !fired.is_empty() {
            self.alerts.write().extend(fired.iter().cloned());
        }
        fired
    }

    /// Evaluate and dispatch every fired alert.
    pub async fn process(&self, metrics: &AlertMetrics) -> Vec<DispatchReport> {
        let fired = self.evaluate(metrics);
        let mut reports = Vec::with_capacity(fired.len());
        for alert in &fired {
            reports.push(self.dispatch(alert).await);
        }
        reports
    }

    /// Raise an alert directly, bypassing rules and cooldowns.
    pub async fn submit(
        &self,
        severity: Severity,
        message: impl Into<String>,
        metrics: AlertMetrics,
    ) -> (Alert, DispatchReport) {
        let alert = Alert::new(None, severity, message, metrics, self.clock.now());
        info!(alert_id = %alert.id, severity = %severity, "manual alert submitted");
        self.alerts.write().push(alert.clone());
        let report = self.dispatch(&alert).await;
        (alert, report)
    }

    /// Send `alert` to every enabled channel concurrently. A failing channel
    /// is recorded in the report and does not affect the others.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let sends = self
            .channels
            .iter()
            .filter(|c| c.enabled())
            .map(|channel| async move { (channel.name().to_owned(), channel.send(alert).await) });
        let outcomes = futures::future::join_all(sends).await;

        let mut report = DispatchReport {
            alert_id: alert.id.clone(),
            ..DispatchReport::default()
        };
        for (channel, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered.push(channel),
                Err(e) => {
                    warn!(channel = %channel, alert_id = %alert.id, error = %e, "alert channel failed");
                    report.failed.push((channel, e.to_string()));
                }
            }
        }
        report
    }

    /// Mark an alert resolved. Returns `false` if it is unknown or already
    /// resolved.
    pub fn resolve_alert(&self, id: &str) -> bool {
        let now = self.clock.now();
        let mut alerts = self.alerts.write();
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) if !alert.resolved => {
                alert.resolved = true;
                alert.resolved_at = Some(now);
                info!(alert_id = %id, "alert resolved");
                true
            }
            _ => false,
        }
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    /// Drop resolved alerts resolved more than `older_than` ago. Unresolved
    /// alerts are never pruned.
    pub fn prune_resolved(&self, older_than: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| self.clock.now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|a| !a.resolved || a.resolved_at.is_none_or(|at| at > cutoff));
        let pruned = before - alerts.len();
        if pruned > 0 {
            debug!(pruned, "resolved alerts pruned");
        }
        pruned
    }
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("config", &self.config)
            .field("rules", &self.rules.read().len())
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bastion_core::ManualClock;

    use super::*;
    use crate::error::ChannelError;
    use crate::rule::RuleCondition;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertChannel for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
            self.sent.lock().push(alert.id.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl AlertChannel for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn send(&self, _alert: &Alert) -> Result<(), ChannelError> {
            Err(ChannelError::Status {
                status: 503,
                body: "down".into(),
            })
        }
    }

    fn failing_metrics() -> AlertMetrics {
        AlertMetrics::default().with_value("upstream_failures", 99.0)
    }

    fn rule(cooldown: u64) -> AlertRule {
        AlertRule::new(
            "failures",
            "Upstream failures",
            RuleCondition::MetricAbove {
                metric: "upstream_failures".into(),
                threshold: 10.0,
            },
            Severity::High,
            cooldown,
        )
    }

    fn engine_at(clock: &Arc<ManualClock>) -> AlertEngine {
        AlertEngine::new(AlertEngineConfig::default())
            .with_clock(clock.clone())
            .with_rules(vec![rule(300)])
            .unwrap()
    }

    #[test]
    fn cooldown_blocks_refiring_until_elapsed() {
        let clock = Arc::new(ManualClock::starting_now());
        let engine = engine_at(&clock);

        assert_eq!(engine.evaluate(&failing_metrics()).len(), 1);
        for _ in 0..9 {
            clock.advance(Duration::from_secs(30));
            assert!(engine.evaluate(&failing_metrics()).is_empty());
        }
        clock.advance(Duration::from_secs(29));
        assert!(engine.evaluate(&failing_metrics()).is_empty(), "t=299");
        clock.advance(Duration::from_secs(1));
        assert_eq!(engine.evaluate(&failing_metrics()).len(), 1, "t=300");
        assert_eq!(engine.active_alerts().len(), 2);
    }

    #[test]
    fn false_conditions_and_disabled_rules_do_not_fire() {
        let clock = Arc::new(ManualClock::starting_now());
        let engine = engine_at(&clock);
        assert!(engine.evaluate(&AlertMetrics::default()).is_empty());

        assert!(engine.set_rule_enabled("failures", false));
        assert!(engine.evaluate(&failing_metrics()).is_empty());
        assert!(!engine.set_rule_enabled("missing", true));
    }

    #[test]
    fn duplicate_rule_ids_are_rejected() {
        let engine = AlertEngine::new(AlertEngineConfig::default());
        engine.add_rule(rule(0)).unwrap();
        assert_eq!(
            engine.add_rule(rule(10)),
            Err(AlertError::DuplicateRule("failures".into()))
        );
        assert!(engine.remove_rule("failures"));
        assert!(!engine.remove_rule("failures"));
    }

    #[tokio::test]
    async fn channel_failures_are_isolated() {
        let recording = Arc::new(Recording::default());
        let engine = AlertEngine::new(AlertEngineConfig::default())
            .with_channel(Arc::new(Broken))
            .with_channel(recording.clone())
            .with_rules(vec![rule(0)])
            .unwrap();

        let reports = engine.process(&failing_metrics()).await;
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.delivered, vec!["recording".to_owned()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert!(!report.all_delivered());
        assert_eq!(recording.sent.lock().as_slice(), [report.alert_id.clone()]);
    }

    #[tokio::test]
    async fn manual_submission_bypasses_rules_and_cooldown() {
        let recording = Arc::new(Recording::default());
        let engine = AlertEngine::new(AlertEngineConfig::default()).with_channel(recording.clone());

        let (first, report) = engine
            .submit(Severity::Low, "maintenance", AlertMetrics::default())
            .await;
        let (second, _) = engine
            .submit(Severity::Low, "maintenance", AlertMetrics::default())
            .await;

        assert!(report.all_delivered());
        assert!(first.rule_id.is_none());
        assert_ne!(first.id, second.id);
        assert_eq!(recording.sent.lock().len(), 2);
        assert_eq!(engine.active_alerts().len(), 2);
    }

    #[tokio::test]
    async fn resolve_is_idempotent_and_prune_keeps_active() {
        let clock = Arc::new(ManualClock::starting_now());
        let engine = AlertEngine::new(AlertEngineConfig::default()).with_clock(clock.clone());
        let (resolved, _) = engine
            .submit(Severity::Medium, "a", AlertMetrics::default())
            .await;
        let (open, _) = engine
            .submit(Severity::Medium, "b", AlertMetrics::default())
            .await;

        assert!(engine.resolve_alert(&resolved.id));
        assert!(!engine.resolve_alert(&resolved.id));
        assert!(!engine.resolve_alert("unknown"));
        assert_eq!(engine.active_alerts(), vec![open.clone()]);

        assert_eq!(engine.prune_resolved(Duration::from_secs(3600)), 0);
        clock.advance(Duration::from_secs(7200));
        assert_eq!(engine.prune_resolved(Duration::from_secs(3600)), 1);
        assert_eq!(engine.alerts(), vec![open]);
    }
}
