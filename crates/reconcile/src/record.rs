use serde::{Deserialize, Serialize};

/// An agent as reported by the supplemental (on-chain) source.
///
/// Only `id` is required. Contestable fields the source does not report are
/// never in conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementalRecord {
    pub id: String,
    /// Alternate identifier, matched against Registry ids and handles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_count: Option<u64>,
    /// Attached to the merged record as its on-chain metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SupplementalRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: None,
            name: None,
            status: None,
            creation_count: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_creation_count(mut self, count: u64) -> Self {
        self.creation_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Fields both sources report and may disagree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestableField {
    Name,
    Status,
    CreationCount,
}

impl ContestableField {
    /// Every contestable field, in evaluation order.
    pub const ALL: [Self; 3] = [Self::Name, Self::Status, Self::CreationCount];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Status => "status",
            Self::CreationCount => "creation_count",
        }
    }
}

impl std::fmt::Display for ContestableField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field-level disagreement is settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the Registry value.
    #[default]
    RegistryWins,
    /// Combine both values. Counts take the larger value; text keeps the
    /// Registry value.
    Merge,
    /// Leave the field unresolved as the Registry reported it.
    Skip,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegistryWins => "registry_wins",
            Self::Merge => "merge",
            Self::Skip => "skip",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one detected disagreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationConflict {
    pub agent_id: String,
    pub field: ContestableField,
    pub registry_value: serde_json::Value,
    pub supplemental_value: serde_json::Value,
    pub resolution: Resolution,
}
