//! Multi-tier caching (L1/L2 cache layers)

use crate::error::{AddError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use wicket_log::debug;

/// Two-layer cache: a fast local L1 in front of a shared L2.
///
/// L2 is the source of truth. Reads fall through to L2 on an L1 miss and
/// may promote the hit into L1 with a shortened TTL. `add` always goes to L2
/// so exclusivity holds across processes sharing it.
pub struct TieredCache<L1, L2>
where
    L1: CacheStore,
    L2: CacheStore,
{
    l1: Arc<L1>,
    l2: Arc<L2>,
    config: TieredCacheConfig,
}

/// Tiered cache configuration
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// Write to L1 on every set
    pub write_through: bool,

    /// Promote L2 hits to L1
    pub promote_to_l1: bool,

    /// L1 TTL as a fraction of the L2 TTL
    pub l1_ttl_fraction: f64,

    /// Upper bound for L1 entries written without a TTL
    pub l1_max_ttl: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            write_through: true,
            promote_to_l1: true,
            l1_ttl_fraction: 0.25,
            l1_max_ttl: Duration::from_secs(60),
        }
    }
}

impl<L1, L2> TieredCache<L1, L2>
where
    L1: CacheStore,
    L2: CacheStore,
{
    /// Create a tiered cache with default settings.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use wicket_cache::*;
    ///
    /// let l1 = Arc::new(InMemoryCache::new());
    /// let l2 = Arc::new(RedisCache::new(config).await?);
    /// let cache = TieredCache::new(l1, l2);
    /// ```
    pub fn new(l1: Arc<L1>, l2: Arc<L2>) -> Self {
        Self::with_config(l1, l2, TieredCacheConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(l1: Arc<L1>, l2: Arc<L2>, config: TieredCacheConfig) -> Self {
        Self { l1, l2, config }
    }

    /// Access the configuration.
    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    fn l1_ttl(&self, ttl: Option<Duration>) -> Duration {
        match ttl {
            Some(ttl) => Duration::from_secs_f64(ttl.as_secs_f64() * self.config.l1_ttl_fraction)
                .min(self.config.l1_max_ttl),
            None => self.config.l1_max_ttl,
        }
    }
}

impl<L1, L2> Clone for TieredCache<L1, L2>
where
    L1: CacheStore,
    L2: CacheStore,
{
    fn clone(&self) -> Self {
        Self {
            l1: self.l1.clone(),
            l2: self.l2.clone(),
            config: self.config.clone(),
        }
    }
}

#[async_trait]
impl<L1, L2> CacheStore for TieredCache<L1, L2>
where
    L1: CacheStore + 'static,
    L2: CacheStore + 'static,
{
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(value) = self.l1.get(key).await? {
            return Ok(Some(value));
        }

        let Some(value) = self.l2.get(key).await? else {
            return Ok(None);
        };

        if self.config.promote_to_l1 {
            let l1_ttl = self.l1_ttl(self.l2.ttl(key).await?);
            if let Err(e) = self.l1.set(key, value.clone(), Some(l1_ttl)).await {
                debug!("L1 promotion failed"; key = key, error = e);
            }
        }

        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        self.l2.set(key, value.clone(), ttl).await?;

        if self.config.write_through {
            self.l1.set(key, value, Some(self.l1_ttl(ttl))).await?;
        } else {
            self.l1.delete(key).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.l1.delete(key).await?;
        self.l2.delete(key).await
    }

    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        // L2 decides; L1 may hold a stale copy either way
        let removed = self.l2.delete_if_eq(key, expected).await?;
        self.l1.delete(key).await?;
        Ok(removed)
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), AddError> {
        self.l2.add(key, value, ttl).await?;
        self.l1.delete(key).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.l2.ttl(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.l1.clear().await?;
        self.l2.clear().await
    }
}
