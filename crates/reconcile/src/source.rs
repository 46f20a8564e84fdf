use async_trait::async_trait;

use crate::error::SourceError;
use crate::record::SupplementalRecord;

/// Read-only provider of supplemental agent records.
#[async_trait]
pub trait SupplementalSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch the full supplemental dataset.
    async fn fetch(&self) -> Result<Vec<SupplementalRecord>, SourceError>;
}

/// A fixed dataset, for tests and for deployments that load supplemental
/// data from a file at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<SupplementalRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<SupplementalRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SupplementalSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<SupplementalRecord>, SourceError> {
        Ok(self.records.clone())
    }
}
