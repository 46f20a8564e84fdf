//! Rule-based alerting for the Bastion gateway.
//!
//! An [`AlertMonitor`] periodically gathers [`AlertMetrics`] through a
//! [`MetricsCollector`], lets the [`AlertEngine`] evaluate every enabled
//! [`AlertRule`] under its cooldown, and dispatches fired alerts to every
//! enabled [`AlertChannel`].

pub mod alert;
pub mod channel;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod rule;
pub mod webhook;

pub use alert::{Alert, Severity};
pub use channel::{AlertChannel, ConsoleChannel, EmailChannel};
pub use engine::{AlertEngine, AlertEngineConfig, DispatchReport};
pub use error::{AlertError, ChannelError};
pub use metrics::{AlertMetrics, GatewayCollector, MetricsCollector};
pub use monitor::AlertMonitor;
pub use rule::{AlertRule, RuleCondition, default_rules};
pub use webhook::{SIGNATURE_HEADER, WebhookChannel};
