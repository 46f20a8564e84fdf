//! The `bastion` binary's library half: configuration, HTTP collaborators,
//! wiring and lifecycle.

pub mod app;
pub mod config;
pub mod error;
pub mod registry_client;
pub mod store_factory;
pub mod supplemental;
pub mod telemetry;

pub use app::{App, RECONCILED_AGENTS_KEY, reconcile_once};
pub use config::BastionConfig;
pub use error::{ConfigError, ServerError};
pub use registry_client::HttpRegistryClient;
pub use supplemental::HttpSupplementalSource;
