// Wicket - signed-cookie web sessions for Rust
//
// This library ties the session manager to its cache backends and logging so
// an application can go from environment variables to a working
// `SessionManager` in one call.

// Re-export session functionality
pub use wicket_session::*;

// Re-export member crates
pub use wicket_cache as cache;
pub use wicket_log as log;

use std::sync::Arc;
use wicket_cache::CacheConfig;

/// Open the configured cache backend and build a manager on top of it.
///
/// ```
/// use wicket::cache::CacheConfig;
/// use wicket::SessionManagerConfig;
///
/// # #[tokio::main]
/// # async fn main() -> wicket::SessionResult<()> {
/// let manager = wicket::connect(
///     CacheConfig::memory(),
///     SessionManagerConfig::new("signing-key", "token-key"),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(
    cache: CacheConfig,
    sessions: SessionManagerConfig,
) -> SessionResult<SessionManager> {
    wicket_log::debug!("opening session store"; backend = cache.backend);
    let store = wicket_cache::open(cache).await?;
    SessionManager::new(store, sessions)
}

/// Build everything from `WICKET_*` environment variables.
///
/// Initializes logging from `WICKET_LOG_*`, opens the cache selected by
/// `WICKET_CACHE_*`, and configures sessions from `WICKET_SESSION_*`.
pub async fn from_env() -> SessionResult<Arc<SessionManager>> {
    wicket_log::init();

    let cache = CacheConfig::from_env()?;
    let sessions = SessionManagerConfig::from_env()?;
    let manager = connect(cache, sessions).await?;

    wicket_log::info!("session manager initialized"; cookie = manager.cookie_config().name);
    Ok(Arc::new(manager))
}

// Prelude for common imports
pub mod prelude {
    pub use crate::cache::{CacheConfig, CacheStore, FileCache, InMemoryCache};
    #[cfg(feature = "redis")]
    pub use crate::cache::RedisCache;
    pub use wicket_session::prelude::*;
}
