use serde::Deserialize;

use bastion_gateway::ApiKeyAuthenticator;

/// Static API keys accepted by the gateway's write path.
///
/// Only SHA-256 hashes are stored; produce one with
/// `printf %s "$KEY" | sha256sum`.
///
/// ```toml
/// [[auth.api_keys]]
/// name = "studio"
/// key_hash = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    /// Caller identity recorded in audit records.
    pub name: String,
    /// Lowercase hex SHA-256 of the raw key.
    pub key_hash: String,
}

impl AuthConfig {
    pub fn authenticator(&self) -> ApiKeyAuthenticator {
        self.api_keys
            .iter()
            .fold(ApiKeyAuthenticator::new(), |auth, key| {
                auth.with_hashed_key(&key.key_hash, &key.name)
            })
    }
}
