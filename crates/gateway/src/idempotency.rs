use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use bastion_cache::TieredCache;

use crate::error::GatewayError;

/// Length of a derived key, in hex characters.
pub const DERIVED_KEY_LEN: usize = 32;

/// Configuration for an [`IdempotencyManager`].
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// How long a stored first result is replayed.
    pub default_ttl: Duration,
    /// Lifetime of the in-flight claim. Must exceed the longest operation.
    pub in_flight_ttl: Duration,
    /// How long a caller that lost the claim waits for the winner's result.
    pub in_flight_wait: Duration,
    /// Polling interval while waiting on another caller's claim.
    pub poll_interval: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            in_flight_ttl: Duration::from_secs(60),
            in_flight_wait: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// The parts of a write request that identify it for deduplication.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyInput {
    pub operation: String,
    pub caller_id: Option<String>,
    pub subject_id: Option<String>,
    pub body: serde_json::Value,
}

impl KeyInput {
    pub fn new(operation: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            operation: operation.into(),
            body,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }
}

/// How time participates in key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Identical content always maps to the same key.
    ContentOnly,
    /// Identical content maps to the same key within a fixed window; the
    /// next window yields a new key.
    TimeWindowed { window: Duration },
}

/// Derive a stable short key from request content.
///
/// Object keys in the body are sorted before hashing, so field order does
/// not affect the result.
pub fn derive_key(input: &KeyInput, mode: KeyMode, now: DateTime<Utc>) -> String {
    let mut material = String::new();
    material.push_str(&input.operation);
    material.push('\u{1f}');
    material.push_str(input.caller_id.as_deref().unwrap_or(""));
    material.push('\u{1f}');
    material.push_str(input.subject_id.as_deref().unwrap_or(""));
    material.push('\u{1f}');
    write_canonical(&input.body, &mut material);

    if let KeyMode::TimeWindowed { window } = mode {
        let window_secs = i64::try_from(window.as_secs().max(1)).unwrap_or(i64::MAX);
        material.push('\u{1f}');
        material.push_str(&now.timestamp().div_euclid(window_secs).to_string());
    }

    let digest = Sha256::digest(material.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(DERIVED_KEY_LEN);
    key
}

/// Serialize `value` as JSON with object keys sorted at every depth.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Result of an idempotent execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed<T> {
    pub value: T,
    /// `true` when the value is a replay of an earlier execution.
    pub from_cache: bool,
    pub key: String,
}

/// Runs each keyed operation at most once per TTL window and replays the
/// first successful result to every later caller.
///
/// Within one process the check-execute-store sequence is serialized per key
/// by an async mutex. Across processes, an atomic `set_if_absent` claim on
/// `<key>:inflight` decides which caller executes; the others poll for the
/// stored result. Failures release the claim and store nothing, so the same
/// key can be retried.
pub struct IdempotencyManager {
    cache: Arc<TieredCache>,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    config: IdempotencyConfig,
}

impl IdempotencyManager {
    pub fn new(cache: Arc<TieredCache>, config: IdempotencyConfig) -> Self {
        Self {
            cache,
            locks: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// Return the stored result for `key`, or run `op` and store its result.
    ///
    /// `ttl = None` uses the configured default.
    pub async fn execute<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        op: F,
    ) -> Result<Executed<T>, GatewayError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        if let Some(value) = self.cache.get::<T>(key).await {
            return Ok(replay(key, value));
        }

        let slot = KeySlot::acquire(&self.locks, key);
        let _guard = slot.lock.lock().await;
        self.execute_locked(key, ttl, op).await
    }

    async fn execute_locked<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        op: F,
    ) -> Result<Executed<T>, GatewayError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let claim_key = format!("{key}:inflight");
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.config.in_flight_wait;

        loop {
            if let Some(value) = self.cache.get::<T>(key).await {
                return Ok(replay(key, value));
            }
            if self
                .cache
                .set_if_absent(&claim_key, &token, Some(self.config.in_flight_ttl))
                .await
            {
                break;
            }
            if Instant::now() >= deadline {
                debug!(key, "idempotency claim held elsewhere, giving up");
                return Err(GatewayError::IdempotencyInFlight(key.to_owned()));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        // The previous holder may have stored its result just before releasing.
        if let Some(value) = self.cache.get::<T>(key).await {
            self.release_claim(&claim_key, &token).await;
            return Ok(replay(key, value));
        }

        let outcome = op().await;
        if let Ok(value) = &outcome {
            self.cache
                .set(key, value, Some(ttl.unwrap_or(self.config.default_ttl)))
                .await;
        }
        self.release_claim(&claim_key, &token).await;

        outcome.map(|value| Executed {
            value,
            from_cache: false,
            key: key.to_owned(),
        })
    }

    /// Delete the in-flight claim only while it still carries `token`. A
    /// claim that outlived its TTL may already belong to another holder.
    async fn release_claim(&self, claim_key: &str, token: &str) {
        match self.cache.get::<String>(claim_key).await {
            Some(holder) if holder == token => {
                self.cache.invalidate(claim_key).await;
            }
            Some(_) => debug!(claim_key, "claim taken over by another holder, leaving it"),
            None => {}
        }
    }
}

/// A per-key lock borrowed from the lock table. Dropping the slot removes the
/// table entry once no other caller holds it, including when the owning
/// future is cancelled mid-flight.
struct KeySlot<'a> {
    locks: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    key: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> KeySlot<'a> {
    fn acquire(locks: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>, key: &'a str) -> Self {
        let lock = Arc::clone(&locks.entry(key.to_owned()).or_default());
        Self { locks, key, lock }
    }
}

impl Drop for KeySlot<'_> {
    fn drop(&mut self) {
        // Two references left: the table's and this slot's.
        self.locks.remove_if(self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

fn replay<T>(key: &str, value: T) -> Executed<T> {
    debug!(key, "idempotent replay");
    Executed {
        value,
        from_cache: true,
        key: key.to_owned(),
    }
}

impl std::fmt::Debug for IdempotencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyManager")
            .field("config", &self.config)
            .field("active_keys", &self.locks.len())
            .finish_non_exhaustive()
    }
}
