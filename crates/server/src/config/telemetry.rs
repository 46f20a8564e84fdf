use serde::Deserialize;

/// Log output configuration.
///
/// `RUST_LOG` takes precedence over `filter` when set.
///
/// ```toml
/// [telemetry]
/// format = "json"
/// filter = "info,bastion_gateway=debug"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            filter: default_filter(),
        }
    }
}

fn default_format() -> String {
    "pretty".to_owned()
}

fn default_filter() -> String {
    "info".to_owned()
}
