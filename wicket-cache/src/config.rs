//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Cache backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local memory
    Memory,
    /// Redis server
    Redis,
    /// One file per key on local disk
    File,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Memory => write!(f, "Memory"),
            CacheBackend::Redis => write!(f, "Redis"),
            CacheBackend::File => write!(f, "File"),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache backend type
    pub backend: CacheBackend,

    /// Connection URL (Redis)
    #[serde(default)]
    pub url: Option<String>,

    /// Storage directory (file backend)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Key prefix for all cache keys
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// TTL applied when a write passes `None`
    #[serde(default, with = "duration_ms::option")]
    pub default_ttl: Option<Duration>,

    /// Connection timeout
    #[serde(with = "duration_ms", default = "default_connection_timeout")]
    pub connection_timeout: Duration,

    /// Per-operation timeout
    #[serde(with = "duration_ms", default = "default_operation_timeout")]
    pub operation_timeout: Duration,

    /// Interval between sweeps of expired entries (file backend)
    #[serde(with = "duration_ms", default = "default_sweep_interval")]
    pub sweep_interval: Duration,

    /// Entries whose modification time is older than this are swept
    /// regardless of their recorded expiry (file backend)
    #[serde(default, with = "duration_ms::option")]
    pub max_entry_age: Option<Duration>,
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(24 * 3600)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl CacheConfig {
    /// In-process memory configuration.
    pub fn memory() -> Self {
        Self {
            backend: CacheBackend::Memory,
            url: None,
            directory: None,
            key_prefix: None,
            default_ttl: None,
            connection_timeout: default_connection_timeout(),
            operation_timeout: default_operation_timeout(),
            sweep_interval: default_sweep_interval(),
            max_entry_age: None,
        }
    }

    /// Create a new Redis cache configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use wicket_cache::CacheConfig;
    ///
    /// let config = CacheConfig::redis("redis://localhost:6379").unwrap();
    /// assert_eq!(config.url.as_deref(), Some("redis://localhost:6379"));
    /// ```
    pub fn redis(url: impl Into<String>) -> CacheResult<Self> {
        let url = url.into();
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(CacheError::InvalidUrl(
                "Redis URL must start with redis:// or rediss://".to_string(),
            ));
        }

        Ok(Self {
            backend: CacheBackend::Redis,
            url: Some(url),
            ..Self::memory()
        })
    }

    /// Create a file-backed configuration rooted at `directory`.
    pub fn file(directory: impl Into<PathBuf>) -> Self {
        Self {
            backend: CacheBackend::File,
            directory: Some(directory.into()),
            ..Self::memory()
        }
    }

    /// Load from `WICKET_CACHE_*` environment variables.
    ///
    /// `WICKET_CACHE_URL` selects Redis, `WICKET_CACHE_DIR` selects the file
    /// backend; with neither set the memory backend is used.
    pub fn from_env() -> CacheResult<Self> {
        let mut config = if let Ok(url) = std::env::var("WICKET_CACHE_URL") {
            Self::redis(url)?
        } else if let Ok(dir) = std::env::var("WICKET_CACHE_DIR") {
            Self::file(dir)
        } else {
            Self::memory()
        };

        if let Ok(prefix) = std::env::var("WICKET_CACHE_PREFIX") {
            config = config.with_key_prefix(prefix);
        }

        if let Ok(secs) = std::env::var("WICKET_CACHE_SWEEP_SECS")
            && let Ok(secs) = secs.parse() {
                config = config.with_sweep_interval(Duration::from_secs(secs));
            }

        Ok(config)
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the maximum entry age.
    pub fn with_max_entry_age(mut self, age: Duration) -> Self {
        self.max_entry_age = Some(age);
        self
    }

    /// Build the final key with prefix if configured.
    pub fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// TTL to apply for a write.
    pub fn effective_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        ttl.or(self.default_ttl)
    }
}

/// Durations as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration
                .map(|d| d.as_millis() as u64)
                .serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let ms = Option::<u64>::deserialize(deserializer)?;
            Ok(ms.map(Duration::from_millis))
        }
    }
}
