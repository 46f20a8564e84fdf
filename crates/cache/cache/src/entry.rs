use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached value together with the bookkeeping needed to expire it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    /// Always at least one second.
    pub ttl_seconds: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            data,
            cached_at,
            ttl_seconds: ttl.as_secs().max(1),
        }
    }

    /// Valid while `now - cached_at < ttl`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.cached_at) < self.ttl()
    }

    /// When this entry stops being valid.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.cached_at
            .checked_add_signed(self.ttl())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn ttl(&self) -> chrono::Duration {
        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}
