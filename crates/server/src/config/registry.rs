use serde::Deserialize;

/// Connection settings for the upstream Registry.
///
/// # Example
///
/// ```toml
/// [registry]
/// base_url = "https://registry.internal:8443/api"
/// token = "registry-service-token"
/// timeout_seconds = 10
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Base URL; endpoint paths are appended to it.
    #[serde(default = "default_registry_url")]
    pub base_url: String,
    /// Bearer token sent on every Registry request.
    pub token: Option<String>,
    /// Upper bound on a single upstream call. Applied by the gateway and
    /// by the HTTP client.
    #[serde(default = "default_registry_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_url(),
            token: None,
            timeout_seconds: default_registry_timeout(),
        }
    }
}

fn default_registry_url() -> String {
    "http://127.0.0.1:8080".to_owned()
}

fn default_registry_timeout() -> u64 {
    10
}
