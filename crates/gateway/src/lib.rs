//! Resilience pipeline in front of the Registry.
//!
//! A [`Gateway`] combines a [`CircuitBreaker`], a two-tier cache, an
//! [`IdempotencyManager`] for writes, an optional [`Authenticator`] and a
//! fire-and-forget audit trail.

pub mod auth;
pub mod background;
pub mod builder;
pub mod circuit_breaker;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod metrics;

pub use auth::{API_KEY_HEADER, ApiKeyAuthenticator, Authenticator, hash_api_key};
pub use background::Scheduler;
pub use builder::{GatewayBuilder, REGISTRY_BREAKER};
pub use circuit_breaker::{BreakerOpen, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState};
pub use error::GatewayError;
pub use gateway::{CallOptions, DerivedKey, Gateway, GatewayConfig, GatewayHealth, WriteOptions};
pub use idempotency::{
    DERIVED_KEY_LEN, Executed, IdempotencyConfig, IdempotencyManager, KeyInput, KeyMode,
    canonical_json, derive_key,
};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
