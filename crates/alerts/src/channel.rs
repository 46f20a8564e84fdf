use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::alert::Alert;
use crate::error::ChannelError;

/// A destination for fired alerts.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Disabled channels are skipped during dispatch.
    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError>;
}

/// Writes one line per alert to stdout or an injected writer.
pub struct ConsoleChannel {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConsoleChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleChannel").finish_non_exhaustive()
    }
}

#[async_trait]
impl AlertChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let mut writer = self.writer.lock();
        writeln!(
            writer,
            "[{}] {} {}: {}",
            alert.timestamp.to_rfc3339(),
            alert.severity.as_str().to_ascii_uppercase(),
            alert.rule_id.as_deref().unwrap_or("manual"),
            alert.message,
        )?;
        writer.flush()?;
        Ok(())
    }
}

/// Email stub: records the intent to send in the log.
#[derive(Debug, Clone)]
pub struct EmailChannel {
    from: String,
    recipients: Vec<String>,
    enabled: bool,
}

impl EmailChannel {
    pub fn new(from: impl Into<String>, recipients: Vec<String>) -> Self {
        let enabled = !recipients.is_empty();
        Self {
            from: from.into(),
            recipients,
            enabled,
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn subject(alert: &Alert) -> String {
        format!(
            "[{}] {}",
            alert.severity.as_str().to_ascii_uppercase(),
            alert.message
        )
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        info!(
            from = %self.from,
            recipients = ?self.recipients,
            subject = %Self::subject(alert),
            alert_id = %alert.id,
            "email alert (not sent)"
        );
        Ok(())
    }
}
