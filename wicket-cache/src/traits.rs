//! Cache store trait definition.

use crate::error::{AddError, CacheResult};
use async_trait::async_trait;
use std::time::Duration;

/// Byte-oriented cache store.
///
/// Values are opaque byte strings. A zero-length value is a legal entry and
/// must round-trip as `Some(vec![])`, distinct from a missing key; higher
/// layers use it as a negative-cache marker.
///
/// A `ttl` of `None` means "no expiry".
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get raw bytes from the cache.
    ///
    /// Returns `Ok(None)` if the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store raw bytes, replacing any existing entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomically delete `key` only while it still holds `expected`.
    ///
    /// Returns `Ok(true)` if the entry was removed and `Ok(false)` if it was
    /// absent, expired, or held a different value.
    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool>;

    /// Atomically store `value` only if `key` is absent.
    ///
    /// Returns [`AddError::AlreadyExists`] when another writer holds the key.
    async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), AddError>;

    /// Remaining time-to-live of a key.
    ///
    /// `Ok(None)` if the key has no expiry or doesn't exist.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Remove every entry owned by this store.
    ///
    /// **Warning:** for shared backends this affects every key under the
    /// configured prefix.
    async fn clear(&self) -> CacheResult<()>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    // ========== Batch Operations (Parallel) ==========

    /// Get multiple keys concurrently, preserving input order.
    async fn get_many(&self, keys: &[&str]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        use futures::future::try_join_all;

        try_join_all(keys.iter().map(|key| self.get(key))).await
    }

    /// Delete multiple keys concurrently.
    async fn delete_many(&self, keys: &[&str]) -> CacheResult<()> {
        use futures::future::try_join_all;

        try_join_all(keys.iter().map(|key| self.delete(key))).await?;
        Ok(())
    }
}
