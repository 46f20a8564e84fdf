use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuditError;
use crate::record::AuditRecord;

/// Destination for per-call audit records.
///
/// The gateway delivers records fire-and-forget: a failing sink is logged
/// and never affects the call that produced the record.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditRecord) -> Result<(), AuditError>;
}

#[async_trait]
impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    async fn record(&self, entry: AuditRecord) -> Result<(), AuditError> {
        (**self).record(entry).await
    }
}
