use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the contents of an agent record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Registry data only; no supplemental match was found.
    #[default]
    Registry,
    /// Registry data with supplemental (on-chain) data attached.
    Merged,
    /// The supplemental source was unreachable; Registry data passed through.
    Fallback,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Merged => "merged",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent as reported by the Registry, optionally enriched by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Registry identifier.
    pub id: String,
    /// Alternate identifier (handle / slug) used by other data sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub name: String,
    /// Lifecycle status as reported upstream (e.g. `ACTIVE`, `ARCHIVED`).
    pub status: String,
    /// Number of creations attributed to the agent.
    #[serde(default)]
    pub creation_count: u64,
    /// Supplemental (on-chain) metadata attached during reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_chain: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    /// Any additional fields the Registry returns, preserved verbatim.
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl AgentRecord {
    /// Build a minimal record; mostly useful for tests and fixtures.
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: None,
            name: name.into(),
            status: status.into(),
            creation_count: 0,
            on_chain: None,
            provenance: None,
            attributes: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    #[must_use]
    pub fn with_creation_count(mut self, count: u64) -> Self {
        self.creation_count = count;
        self
    }
}

/// Query filter for listing agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl AgentFilter {
    /// Stable textual form used to build cache keys.
    pub fn cache_fragment(&self) -> String {
        format!(
            "status={}&limit={}",
            self.status.as_deref().unwrap_or("*"),
            self.limit.map_or_else(|| "*".to_owned(), |l| l.to_string()),
        )
    }
}

/// A creation (work item) published by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creation {
    pub id: String,
    pub agent_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_uri: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Body of a create-creation write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCreation {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_uri: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
