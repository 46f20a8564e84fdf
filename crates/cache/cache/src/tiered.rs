use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use bastion_core::{CacheHealth, SharedClock, system_clock};

use crate::codec;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::glob::glob_to_regex;
use crate::store::DistributedStore;

/// Configuration for a [`TieredCache`].
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// Prefix applied to every key in the distributed tier.
    pub prefix: String,
    /// TTL used when the caller does not pass one.
    pub default_ttl: Duration,
    /// Payloads longer than this many bytes are compressed before they are
    /// written to the distributed tier.
    pub compression_threshold: usize,
    /// Upper bound on any single distributed-store round trip.
    pub store_timeout: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            prefix: String::from("bastion:"),
            default_ttl: Duration::from_secs(60),
            compression_threshold: 1024,
            store_timeout: Duration::from_millis(250),
        }
    }
}

/// Read-through cache with a distributed tier and an in-process fallback.
///
/// - `get` consults the distributed store first and falls back to the local
///   map on a miss or on any store failure.
/// - `set` writes both tiers; a failing distributed write is logged and
///   ignored.
/// - Both tiers hold [`CacheEntry`] values and expire them against the
///   injected clock, so a store that forgets to honor its TTL cannot serve
///   stale data.
///
/// No method returns a [`CacheError`]: cache failures degrade, they never
/// fail the caller.
pub struct TieredCache {
    store: Option<Arc<dyn DistributedStore>>,
    fallback: DashMap<String, CacheEntry<serde_json::Value>>,
    clock: SharedClock,
    config: TieredCacheConfig,
}

impl TieredCache {
    /// Create a cache. `store = None` runs on the in-process tier alone.
    pub fn new(config: TieredCacheConfig, store: Option<Arc<dyn DistributedStore>>) -> Self {
        Self {
            store,
            fallback: DashMap::new(),
            clock: system_clock(),
            config,
        }
    }

    /// Replace the clock used for TTL decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    /// Whether a distributed store is configured.
    pub fn has_distributed_tier(&self) -> bool {
        self.store.is_some()
    }

    /// Look up `key`, returning the value only if it is present and unexpired.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.clock.now();

        if let Some(store) = &self.store {
            let dkey = self.distributed_key(key);
            match self.bounded(store.get(&dkey)).await {
                Ok(Some(raw)) => match decode_entry(&raw) {
                    Ok(entry) if entry.is_valid_at(now) => {
                        match serde_json::from_value(entry.data) {
                            Ok(value) => return Some(value),
                            Err(e) => warn!(key, error = %e, "cached value has unexpected shape"),
                        }
                    }
                    Ok(_) => debug!(key, "distributed entry expired"),
                    Err(e) => warn!(key, error = %e, "undecodable distributed cache entry"),
                },
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "distributed cache get failed, using fallback"),
            }
        }

        self.fallback_get(key, now)
    }

    /// Store `value` under `key` in both tiers.
    ///
    /// `ttl = None` uses the configured default TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let Some(entry) = self.make_entry(key, value, ttl) else {
            return;
        };

        if let Some(store) = &self.store {
            let dkey = self.distributed_key(key);
            let ttl = Duration::from_secs(entry.ttl_seconds);
            match self.encode_entry(&entry) {
                Ok(payload) => {
                    if let Err(e) = self.bounded(store.set_with_ttl(&dkey, &payload, ttl)).await {
                        warn!(key, error = %e, "distributed cache set failed, kept in fallback");
                    }
                }
                Err(e) => warn!(key, error = %e, "failed to encode cache entry"),
            }
        }

        self.fallback.insert(key.to_owned(), entry);
    }

    /// Store `value` only if no live value exists under `key`.
    ///
    /// Uses the distributed store's atomic conditional set when it is
    /// reachable; otherwise the check-and-insert is atomic on the fallback map.
    /// Returns `true` if this call stored the value.
    pub async fn set_if_absent<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let Some(entry) = self.make_entry(key, value, ttl) else {
            return false;
        };
        let now = entry.cached_at;

        if let Some(store) = &self.store {
            let dkey = self.distributed_key(key);
            let ttl = Duration::from_secs(entry.ttl_seconds);
            let attempt = match self.encode_entry(&entry) {
                Ok(payload) => self.bounded(store.set_if_absent(&dkey, &payload, ttl)).await,
                Err(e) => Err(e),
            };
            match attempt {
                Ok(true) => {
                    self.fallback.insert(key.to_owned(), entry);
                    return true;
                }
                Ok(false) => return false,
                Err(e) => {
                    warn!(key, error = %e, "distributed set_if_absent failed, using fallback");
                }
            }
        }

        match self.fallback.entry(key.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_valid_at(now) {
                    false
                } else {
                    occupied.insert(entry);
                    true
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    /// Remove `key` from both tiers. Returns `true` if either tier held it.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut removed = false;

        if let Some(store) = &self.store {
            let dkey = self.distributed_key(key);
            match self.bounded(store.delete(&dkey)).await {
                Ok(existed) => removed |= existed,
                Err(e) => warn!(key, error = %e, "distributed cache delete failed"),
            }
        }

        removed |= self.fallback.remove(key).is_some();
        removed
    }

    /// Remove every key matching `pattern` (glob, `*` wildcard) from both
    /// tiers. Returns the number of distinct logical keys removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut removed: HashSet<String> = HashSet::new();

        if let Some(store) = &self.store {
            let dpattern = self.distributed_key(pattern);
            match self.bounded(store.keys_matching(&dpattern)).await {
                Ok(keys) => {
                    for dkey in keys {
                        match self.bounded(store.delete(&dkey)).await {
                            Ok(true) => {
                                let logical = dkey
                                    .strip_prefix(self.config.prefix.as_str())
                                    .unwrap_or(&dkey);
                                removed.insert(logical.to_owned());
                            }
                            Ok(false) => {}
                            Err(e) => warn!(key = %dkey, error = %e, "distributed cache delete failed"),
                        }
                    }
                }
                Err(e) => warn!(pattern, error = %e, "distributed key scan failed"),
            }
        }

        match glob_to_regex(pattern) {
            Ok(re) => {
                self.fallback.retain(|key, _| {
                    if re.is_match(key) {
                        removed.insert(key.clone());
                        false
                    } else {
                        true
                    }
                });
            }
            Err(e) => warn!(pattern, error = %e, "invalid invalidation pattern"),
        }

        debug!(pattern, removed = removed.len(), "cache pattern invalidated");
        removed.len()
    }

    /// Drop expired entries from the fallback tier. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.fallback.len();
        self.fallback.retain(|_, entry| entry.is_valid_at(now));
        before.saturating_sub(self.fallback.len())
    }

    /// Number of live entries in the fallback tier.
    pub fn fallback_len(&self) -> usize {
        let now = self.clock.now();
        self.fallback
            .iter()
            .filter(|entry| entry.value().is_valid_at(now))
            .count()
    }

    /// Report distributed-tier reachability and fallback size separately.
    pub async fn health(&self) -> CacheHealth {
        let fallback_entries = self.fallback_len();
        let Some(store) = &self.store else {
            return CacheHealth {
                distributed_configured: false,
                distributed_reachable: false,
                distributed_error: None,
                fallback_entries,
            };
        };

        let (distributed_reachable, distributed_error) = match self.bounded(store.ping()).await {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };

        CacheHealth {
            distributed_configured: true,
            distributed_reachable,
            distributed_error,
            fallback_entries,
        }
    }

    fn distributed_key(&self, key: &str) -> String {
        format!("{}{key}", self.config.prefix)
    }

    fn fallback_get<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        let data = {
            let entry = self.fallback.get(key)?;
            if entry.is_valid_at(now) {
                Some(entry.data.clone())
            } else {
                None
            }
        };

        let Some(data) = data else {
            self.fallback
                .remove_if(key, |_, entry| !entry.is_valid_at(now));
            return None;
        };

        match serde_json::from_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "fallback value has unexpected shape");
                None
            }
        }
    }

    fn make_entry<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Option<CacheEntry<serde_json::Value>> {
        match serde_json::to_value(value) {
            Ok(data) => Some(CacheEntry::new(
                data,
                self.clock.now(),
                ttl.unwrap_or(self.config.default_ttl),
            )),
            Err(e) => {
                warn!(key, error = %e, "value is not serializable, not caching");
                None
            }
        }
    }

    fn encode_entry(&self, entry: &CacheEntry<serde_json::Value>) -> Result<String, CacheError> {
        let json =
            serde_json::to_string(entry).map_err(|e| CacheError::Serialization(e.to_string()))?;
        codec::encode(&json, self.config.compression_threshold)
    }

    async fn bounded<R>(
        &self,
        op: impl Future<Output = Result<R, CacheError>>,
    ) -> Result<R, CacheError> {
        match tokio::time::timeout(self.config.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.config.store_timeout)),
        }
    }
}

fn decode_entry(raw: &str) -> Result<CacheEntry<serde_json::Value>, CacheError> {
    let json = codec::decode(raw)?;
    serde_json::from_str(&json).map_err(|e| CacheError::Serialization(e.to_string()))
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.config)
            .field("distributed", &self.store.is_some())
            .field("fallback_entries", &self.fallback.len())
            .finish_non_exhaustive()
    }
}
