//! Redis backend for the Bastion distributed cache tier.
//!
//! Implements [`DistributedStore`] over a `deadpool-redis` pool:
//!
//! - values are plain Redis strings written with `SET .. PX`
//! - `set_if_absent` is a single `SET .. NX PX`, atomic across instances
//! - pattern listing walks `SCAN .. MATCH` and never blocks the server with `KEYS`
//!
//! Integration tests against a live server run with `--features integration`
//! and honor `REDIS_URL`.
//!
//! [`DistributedStore`]: bastion_cache::DistributedStore

mod config;
mod store;

pub use config::RedisConfig;
pub use store::RedisStore;
