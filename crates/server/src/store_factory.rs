use std::sync::Arc;

use bastion_cache::DistributedStore;
use bastion_cache_memory::MemoryStore;
#[cfg(feature = "redis")]
use bastion_cache_redis::{RedisConfig, RedisStore};

use crate::config::CacheServerConfig;
use crate::error::{ConfigError, ServerError};

/// Create the distributed cache tier from `[cache]`.
///
/// Returns `None` for the `none` backend, leaving only the in-process tier.
pub fn create_store(
    config: &CacheServerConfig,
) -> Result<Option<Arc<dyn DistributedStore>>, ServerError> {
    let store: Arc<dyn DistributedStore> = match config.backend.as_str() {
        "none" => return Ok(None),
        "memory" => Arc::new(MemoryStore::new()),
        #[cfg(feature = "redis")]
        "redis" => {
            let url = config.url.as_deref().ok_or_else(|| ConfigError::Invalid {
                section: "cache",
                reason: "redis backend requires [cache] url".into(),
            })?;
            let redis_config = RedisConfig {
                pool_size: config.pool_size,
                ..RedisConfig::new(url)
            };
            Arc::new(RedisStore::new(&redis_config)?)
        }
        other => {
            return Err(ConfigError::Invalid {
                section: "cache",
                reason: format!("unsupported cache backend \"{other}\" in this build"),
            }
            .into());
        }
    };
    Ok(Some(store))
}
