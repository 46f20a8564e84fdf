use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use bastion_core::{AgentRecord, Clock, Provenance, ReconciliationSummary, SharedClock, system_clock};

use crate::error::SourceError;
use crate::policy::ResolutionPolicy;
use crate::record::{ContestableField, ReconciliationConflict, Resolution, SupplementalRecord};
use crate::source::SupplementalSource;

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Upper bound on one supplemental fetch.
    #[serde(with = "duration_secs")]
    pub fetch_timeout: Duration,
    pub policy: ResolutionPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            policy: ResolutionPolicy::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.fetch_timeout.is_zero() {
            return Err("fetch_timeout must be greater than zero".into());
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub records: Vec<AgentRecord>,
    pub total: usize,
    pub supplemental_data_available: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ReconciliationConflict>,
}

impl ReconciliationResult {
    /// Outcome counts for health reporting.
    pub fn summary(&self) -> ReconciliationSummary {
        let count = |p: Provenance| {
            self.records
                .iter()
                .filter(|r| r.provenance == Some(p))
                .count()
        };
        ReconciliationSummary {
            total: self.total,
            merged: count(Provenance::Merged),
            registry_only: count(Provenance::Registry),
            fallback: count(Provenance::Fallback),
            conflicts: self.conflicts.len(),
            supplemental_data_available: self.supplemental_data_available,
            timestamp: self.timestamp,
        }
    }
}

/// Merges Registry records with a supplemental dataset.
///
/// The Registry is authoritative for every core field. A matched
/// supplemental record contributes its metadata as `on_chain` and is
/// compared on the [`ContestableField`]s; each disagreement becomes a
/// [`ReconciliationConflict`] settled by the configured policy.
pub struct ReconciliationEngine {
    source: Arc<dyn SupplementalSource>,
    config: ReconcileConfig,
    clock: SharedClock,
    last_summary: RwLock<Option<ReconciliationSummary>>,
}

impl ReconciliationEngine {
    pub fn new(source: Arc<dyn SupplementalSource>, config: ReconcileConfig) -> Self {
        Self {
            source,
            config,
            clock: system_clock(),
            last_summary: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Summary of the most recent pass, if any has run.
    pub fn last_summary(&self) -> Option<ReconciliationSummary> {
        self.last_summary.read().clone()
    }

    /// Reconcile `primary` against the supplemental dataset.
    ///
    /// Never fails: an unreachable or slow source yields every record
    /// unchanged with `fallback` provenance.
    pub async fn reconcile(&self, primary: Vec<AgentRecord>) -> ReconciliationResult {
        let started = Instant::now();
        let timestamp = self.clock.now();

        let result = match self.fetch().await {
            Ok(supplemental) => self.merge_all(primary, &supplemental, timestamp),
            Err(e) => {
                warn!(
                    source = self.source.name(),
                    error = %e,
                    "supplemental data unavailable, passing registry records through"
                );
                fallback(primary, timestamp)
            }
        };

        let summary = result.summary();
        info!(
            total = summary.total,
            merged = summary.merged,
            registry_only = summary.registry_only,
            fallback = summary.fallback,
            conflicts = summary.conflicts,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "reconciliation complete"
        );
        *self.last_summary.write() = Some(summary);
        result
    }

    async fn fetch(&self) -> Result<Vec<SupplementalRecord>, SourceError> {
        match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.config.fetch_timeout)),
        }
    }

    fn merge_all(
        &self,
        primary: Vec<AgentRecord>,
        supplemental: &[SupplementalRecord],
        timestamp: DateTime<Utc>,
    ) -> ReconciliationResult {
        // First record wins when ids or aliases collide.
        let mut index: HashMap<&str, &SupplementalRecord> = HashMap::new();
        for record in supplemental {
            index.entry(record.id.as_str()).or_insert(record);
            if let Some(alias) = &record.alias {
                index.entry(alias.as_str()).or_insert(record);
            }
        }

        let total = primary.len();
        let mut conflicts = Vec::new();
        let records = primary
            .into_iter()
            .map(|mut record| {
                let matched = index
                    .get(record.id.as_str())
                    .or_else(|| record.handle.as_deref().and_then(|h| index.get(h)))
                    .copied();
                match matched {
                    Some(supp) => {
                        self.merge_one(&mut record, supp, &mut conflicts);
                        record.provenance = Some(Provenance::Merged);
                    }
                    None => record.provenance = Some(Provenance::Registry),
                }
                record
            })
            .collect();

        if !conflicts.is_empty() {
            debug!(count = conflicts.len(), "reconciliation conflicts detected");
        }

        ReconciliationResult {
            records,
            total,
            supplemental_data_available: true,
            timestamp,
            conflicts,
        }
    }

    fn merge_one(
        &self,
        record: &mut AgentRecord,
        supp: &SupplementalRecord,
        conflicts: &mut Vec<ReconciliationConflict>,
    ) {
        record.on_chain = Some(supp.metadata.clone());

        for field in ContestableField::ALL {
            let Some((registry_value, supplemental_value)) = disagreement(record, supp, field)
            else {
                continue;
            };
            let resolution = self.config.policy.resolution_for(field);

            if resolution == Resolution::Merge && field == ContestableField::CreationCount {
                if let Some(count) = supp.creation_count {
                    record.creation_count = record.creation_count.max(count);
                }
            }

            conflicts.push(ReconciliationConflict {
                agent_id: record.id.clone(),
                field,
                registry_value,
                supplemental_value,
                resolution,
            });
        }
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The two values of `field` when both sources report it and they differ.
fn disagreement(
    record: &AgentRecord,
    supp: &SupplementalRecord,
    field: ContestableField,
) -> Option<(Value, Value)> {
    match field {
        ContestableField::Name => supp
            .name
            .as_deref()
            .filter(|name| *name != record.name)
            .map(|name| (json!(record.name), json!(name))),
        ContestableField::Status => supp
            .status
            .as_deref()
            .filter(|status| *status != record.status)
            .map(|status| (json!(record.status), json!(status))),
        ContestableField::CreationCount => supp
            .creation_count
            .filter(|count| *count != record.creation_count)
            .map(|count| (json!(record.creation_count), json!(count))),
    }
}

fn fallback(primary: Vec<AgentRecord>, timestamp: DateTime<Utc>) -> ReconciliationResult {
    let total = primary.len();
    let records = primary
        .into_iter()
        .map(|mut record| {
            record.provenance = Some(Provenance::Fallback);
            record
        })
        .collect();
    ReconciliationResult {
        records,
        total,
        supplemental_data_available: false,
        timestamp,
        conflicts: Vec::new(),
    }
}
