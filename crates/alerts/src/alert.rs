use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::AlertMetrics;

/// Alert severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fired alert. Persists until resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    /// Rule that fired, or `None` for manually submitted alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    /// Metrics the alert was raised against.
    pub metrics: AlertMetrics,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        rule_id: Option<String>,
        severity: Severity,
        message: impl Into<String>,
        metrics: AlertMetrics,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            rule_id,
            timestamp,
            severity,
            message: message.into(),
            metrics,
            resolved: false,
            resolved_at: None,
        }
    }
}
