use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// A shared key/value store backing the distributed cache tier.
///
/// Keys arrive fully prefixed. Implementations must be `Send + Sync` and safe
/// for concurrent access; every failure is reported as a [`CacheError`] and
/// callers treat it as a degraded tier, never as a request failure.
#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// Get the raw value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a value that expires after `ttl`, overwriting any previous value.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), CacheError>;

    /// Atomically set the value only if no live value exists.
    /// Returns `true` if the key was newly set.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Delete a key. Returns `true` if a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// List keys matching a glob pattern (`*` and `?` wildcards).
    ///
    /// This may be expensive on some backends. Use sparingly.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Round-trip to the backend to prove it is reachable.
    async fn ping(&self) -> Result<(), CacheError>;
}
