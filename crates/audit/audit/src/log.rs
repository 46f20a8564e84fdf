use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::AuditError;
use crate::record::AuditRecord;
use crate::sink::AuditSink;

/// Audit sink that emits each record as a structured `tracing` event on the
/// `bastion::audit` target.
///
/// Successful calls are logged at `info`, everything else at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, entry: AuditRecord) -> Result<(), AuditError> {
        if entry.status.is_success() {
            info!(
                target: "bastion::audit",
                trace_id = %entry.trace_id,
                operation = %entry.operation,
                method = %entry.method,
                status = %entry.status,
                status_code = entry.status_code,
                duration_ms = entry.duration_ms,
                user_id = entry.user_id.as_deref(),
                "gateway call"
            );
        } else {
            warn!(
                target: "bastion::audit",
                trace_id = %entry.trace_id,
                operation = %entry.operation,
                method = %entry.method,
                status = %entry.status,
                status_code = entry.status_code,
                duration_ms = entry.duration_ms,
                user_id = entry.user_id.as_deref(),
                error = entry.error.as_deref(),
                "gateway call failed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::record::{CallMethod, CallStatus};

    #[tokio::test]
    async fn never_fails() {
        let sink = LogAuditSink;
        let ok = AuditRecord::new("t", "op", CallMethod::Get, CallStatus::Ok, Utc::now());
        let err = AuditRecord::new("t", "op", CallMethod::Post, CallStatus::Error, Utc::now())
            .with_error("boom", Some(500));
        assert!(sink.record(ok).await.is_ok());
        assert!(sink.record(err).await.is_ok());
    }
}
