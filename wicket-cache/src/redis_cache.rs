//! Redis cache implementation.

use crate::config::CacheConfig;
use crate::error::{AddError, CacheError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};
use std::future::Future;
use std::time::Duration;
use wicket_log::{debug, info};

/// Redis cache store.
///
/// Every key is namespaced with the configured prefix. Writes use
/// millisecond expiry (`PX`) so sub-second session TTLs survive.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl RedisCache {
    /// Create a new Redis cache instance.
    ///
    /// # Arguments
    ///
    /// * `config` - Cache configuration; `url` must be set
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wicket_cache::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), CacheError> {
    ///     let config = CacheConfig::redis("redis://localhost:6379")?;
    ///     let cache = RedisCache::new(config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| CacheError::Config("Redis backend requires a url".to_string()))?;

        let client = Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        info!("Connected to Redis"; prefix = config.key_prefix.as_deref().unwrap_or("-"));
        Ok(Self { connection, config })
    }

    /// Get the underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    fn build_key(&self, key: &str) -> String {
        self.config.build_key(key)
    }

    async fn bounded<T, F>(&self, op: F) -> CacheResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

const COMPARE_AND_DELETE: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

fn millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        self.bounded(redis::cmd("GET").arg(&key).query_async(&mut conn))
            .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();

        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(value);
        if let Some(ttl) = self.config.effective_ttl(ttl) {
            cmd.arg("PX").arg(millis(ttl));
        }

        self.bounded(cmd.query_async::<()>(&mut conn)).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        let _: i64 = self
            .bounded(redis::cmd("DEL").arg(&key).query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        let removed: i64 = self
            .bounded(
                redis::Script::new(COMPARE_AND_DELETE)
                    .key(&key)
                    .arg(expected)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(removed > 0)
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), AddError> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        let mut cmd = redis::cmd("SET");
        cmd.arg(&full_key).arg(value).arg("NX");
        if let Some(ttl) = self.config.effective_ttl(ttl) {
            cmd.arg("PX").arg(millis(ttl));
        }

        let reply: Option<String> = self.bounded(cmd.query_async(&mut conn)).await?;
        match reply {
            Some(_) => Ok(()),
            None => Err(AddError::AlreadyExists(key.to_string())),
        }
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();

        let ttl_ms: i64 = self
            .bounded(redis::cmd("PTTL").arg(&key).query_async(&mut conn))
            .await?;

        // -2: missing, -1: no expiry
        match ttl_ms {
            ms if ms > 0 => Ok(Some(Duration::from_millis(ms as u64))),
            _ => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        let count: i64 = self
            .bounded(redis::cmd("EXISTS").arg(&key).query_async(&mut conn))
            .await?;
        Ok(count > 0)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut conn = self.connection.clone();

        let Some(prefix) = self.config.key_prefix.as_deref() else {
            return self
                .bounded(redis::cmd("FLUSHDB").query_async::<()>(&mut conn))
                .await;
        };

        let pattern = format!("{}:*", prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(500)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                removed += keys.len();
                let _: i64 = self
                    .bounded(redis::cmd("DEL").arg(&keys).query_async(&mut conn))
                    .await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("cleared prefixed keys"; prefix = prefix, removed = removed);
        Ok(())
    }
}
