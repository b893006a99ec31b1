//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Filesystem error (file backend)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored entry could not be interpreted
    #[error("Corrupt entry for key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Generic error
    #[error("Cache error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Timeout | CacheError::Connection(_) | CacheError::Io(_) => true,
            #[cfg(feature = "redis")]
            CacheError::Redis(e) => e.is_timeout() || e.is_connection_dropped(),
            _ => false,
        }
    }
}

/// Failure of [`CacheStore::add`](crate::CacheStore::add).
#[derive(Debug, Error)]
pub enum AddError {
    /// The key is already present and unexpired.
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    /// The backend failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl AddError {
    /// True for [`AddError::AlreadyExists`].
    pub fn is_already_exists(&self) -> bool {
        matches!(self, AddError::AlreadyExists(_))
    }
}
