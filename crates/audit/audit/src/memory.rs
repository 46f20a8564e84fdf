use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::AuditError;
use crate::record::{AuditRecord, CallStatus};
use crate::sink::AuditSink;

/// In-memory audit sink. Suitable for development and testing.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records received so far, in arrival order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn by_operation(&self, operation: &str) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.operation == operation)
            .cloned()
            .collect()
    }

    pub fn by_status(&self, status: CallStatus) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::record::CallMethod;

    #[tokio::test]
    async fn records_are_kept_in_order_and_filterable() {
        let sink = MemoryAuditSink::new();
        for (op, status) in [
            ("get_agents", CallStatus::Ok),
            ("get_agents", CallStatus::CacheHit),
            ("create_creation", CallStatus::Unauthorized),
        ] {
            sink.record(AuditRecord::new("t", op, CallMethod::Get, status, Utc::now()))
                .await
                .unwrap();
        }

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.by_operation("get_agents").len(), 2);
        assert_eq!(sink.by_status(CallStatus::Unauthorized).len(), 1);
        assert_eq!(sink.records()[1].status, CallStatus::CacheHit);

        sink.clear();
        assert!(sink.is_empty());
    }
}
