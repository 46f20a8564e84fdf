use thiserror::Error;

/// Errors from cache tiers and distributed store backends.
///
/// These never escape the [`TieredCache`](crate::TieredCache) public API;
/// they are logged and degraded to the next tier or to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("invalid key pattern: {0}")]
    Pattern(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
