pub mod codec;
pub mod entry;
pub mod error;
pub mod glob;
pub mod store;
pub mod testing;
pub mod tiered;

pub use entry::CacheEntry;
pub use error::CacheError;
pub use store::DistributedStore;
pub use tiered::{TieredCache, TieredCacheConfig};
