use std::time::Duration;

use serde::Deserialize;

use bastion_cache::TieredCacheConfig;

/// Configuration for the tiered cache and its distributed backend.
///
/// # Example
///
/// ```toml
/// [cache]
/// backend = "redis"
/// url = "redis://127.0.0.1:6379"
/// prefix = "bastion:"
/// default_ttl_seconds = 60
/// read_ttl_seconds = 300
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheServerConfig {
    /// Distributed tier backend: `"memory"`, `"redis"` or `"none"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Connection URL for the `redis` backend.
    pub url: Option<String>,
    /// Prefix applied to every key in the distributed tier.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// TTL used when a caller does not pass one.
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: u64,
    /// TTL of the typed Registry reads.
    #[serde(default = "default_read_ttl")]
    pub read_ttl_seconds: u64,
    /// Payloads above this many bytes are compressed in the distributed tier.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
    /// Upper bound on one distributed-store round trip.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Redis connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Period of the fallback-tier cleanup loop.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for CacheServerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            prefix: default_prefix(),
            default_ttl_seconds: default_ttl(),
            read_ttl_seconds: default_read_ttl(),
            compression_threshold: default_compression_threshold(),
            store_timeout_ms: default_store_timeout_ms(),
            pool_size: default_pool_size(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl CacheServerConfig {
    pub fn tiered_config(&self) -> TieredCacheConfig {
        TieredCacheConfig {
            prefix: self.prefix.clone(),
            default_ttl: Duration::from_secs(self.default_ttl_seconds),
            compression_threshold: self.compression_threshold,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }
}

fn default_backend() -> String {
    "memory".to_owned()
}

fn default_prefix() -> String {
    "bastion:".to_owned()
}

fn default_ttl() -> u64 {
    60
}

fn default_read_ttl() -> u64 {
    300
}

fn default_compression_threshold() -> usize {
    1024
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_pool_size() -> usize {
    10
}

fn default_cleanup_interval() -> u64 {
    60
}
