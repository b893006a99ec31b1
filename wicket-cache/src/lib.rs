//! Byte-oriented cache stores for wicket.
//!
//! Every backend implements [`CacheStore`]: opaque byte values with optional
//! per-entry TTL, an atomic create-if-absent ([`CacheStore::add`]) usable as
//! a lock primitive, and zero-length values that round-trip distinct from a
//! missing key.
//!
//! # Features
//!
//! - `redis` - Enable Redis cache support (enabled by default)
//!
//! # Backends
//!
//! - [`InMemoryCache`] - process-local, for tests and single-node setups
//! - [`TieredCache`] - local L1 in front of a shared L2
//! - [`RedisCache`] - shared Redis server
//! - [`FileCache`] - one file per key with a background sweeper
//!
//! # Examples
//!
//! ```
//! use wicket_cache::*;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), CacheError> {
//! let cache = InMemoryCache::new();
//! cache.set("key", b"value".to_vec(), Some(Duration::from_secs(60))).await?;
//! assert_eq!(cache.get("key").await?, Some(b"value".to_vec()));
//!
//! cache.add("lock:key", b"owner".to_vec(), None).await.unwrap();
//! assert!(cache.add("lock:key", b"other".to_vec(), None).await.is_err());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod file_cache;
pub mod memory;
pub mod tiered;
pub mod traits;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use config::{CacheBackend, CacheConfig};
pub use error::{AddError, CacheError, CacheResult};
pub use file_cache::FileCache;
pub use memory::InMemoryCache;
pub use tiered::{TieredCache, TieredCacheConfig};
pub use traits::CacheStore;

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

use std::sync::Arc;

/// Open the store selected by `config.backend`.
///
/// ```
/// use wicket_cache::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), CacheError> {
/// let store = open(CacheConfig::memory()).await?;
/// store.set("k", vec![1, 2, 3], None).await?;
/// # Ok(())
/// # }
/// ```
pub async fn open(config: CacheConfig) -> CacheResult<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(InMemoryCache::new())),
        CacheBackend::File => Ok(Arc::new(FileCache::new(config).await?)),
        #[cfg(feature = "redis")]
        CacheBackend::Redis => Ok(Arc::new(RedisCache::new(config).await?)),
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => Err(CacheError::Config(
            "Redis backend requires the `redis` feature".to_string(),
        )),
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CacheBackend, CacheConfig};
    pub use crate::error::{AddError, CacheError, CacheResult};
    pub use crate::file_cache::FileCache;
    pub use crate::memory::InMemoryCache;
    pub use crate::tiered::{TieredCache, TieredCacheConfig};
    pub use crate::traits::CacheStore;

    #[cfg(feature = "redis")]
    pub use crate::redis_cache::RedisCache;
}
