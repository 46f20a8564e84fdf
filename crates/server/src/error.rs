use std::path::PathBuf;

use thiserror::Error;

use bastion_alerts::{AlertError, ChannelError};
use bastion_cache::CacheError;
use bastion_gateway::GatewayError;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid [{section}] configuration: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
}

/// Errors that can occur while wiring or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cache backend error: {0}")]
    Cache(#[from] CacheError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("alert rule error: {0}")]
    Alerts(#[from] AlertError),

    #[error("alert channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}
