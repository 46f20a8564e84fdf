use serde::Deserialize;

/// Supplemental (on-chain) data source.
///
/// When `url` is unset, reconciliation runs against an empty source and
/// every record keeps `registry` provenance.
///
/// ```toml
/// [supplemental]
/// url = "https://indexer.internal/agents"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupplementalConfig {
    pub url: Option<String>,
    /// Bearer token for the source, if it needs one.
    pub token: Option<String>,
}
