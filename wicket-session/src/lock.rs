//! Per-session mutual exclusion across processes sharing a cache.

use crate::adapter::CacheAdapter;
use crate::error::{SessionError, SessionResult};
use std::time::Duration;
use uuid::Uuid;
use wicket_cache::AddError;
use wicket_log::{debug, redact, warn};

/// Default lock lifetime. A crashed holder blocks others at most this long.
pub const LOCK_TTL: Duration = Duration::from_secs(5);

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Cache key guarding a session.
pub fn lock_key(session_id: &str) -> String {
    format!("lock:{}", session_id)
}

/// Session lock built on the adapter's atomic `add`.
///
/// Release is a compare-and-delete on the holder's token, so a guard whose
/// entry expired and was taken over never removes the new holder's lock.
#[derive(Clone)]
pub struct CacheLock {
    adapter: CacheAdapter,
    ttl: Duration,
}

impl CacheLock {
    /// Create a lock with the default TTL.
    pub fn new(adapter: CacheAdapter) -> Self {
        Self::with_ttl(adapter, LOCK_TTL)
    }

    /// Create a lock with a custom TTL.
    pub fn with_ttl(adapter: CacheAdapter, ttl: Duration) -> Self {
        Self { adapter, ttl }
    }

    /// Try once to lock `session_id`.
    ///
    /// Returns [`SessionError::LockContention`] if another holder owns it.
    pub async fn try_acquire(&self, session_id: &str) -> SessionResult<LockGuard> {
        let key = lock_key(session_id);
        let token = Uuid::new_v4().to_string();

        match self
            .adapter
            .add(&key, token.clone().into_bytes(), self.ttl)
            .await
        {
            Ok(()) => {
                debug!("acquired session lock"; session = redact(session_id));
                Ok(LockGuard {
                    adapter: self.adapter.clone(),
                    key,
                    token,
                    released: false,
                })
            }
            Err(AddError::AlreadyExists(_)) => {
                debug!("session lock held elsewhere"; session = redact(session_id));
                Err(SessionError::LockContention)
            }
            Err(AddError::Cache(e)) => Err(e.into()),
        }
    }

    /// Retry [`try_acquire`](Self::try_acquire) until `timeout` elapses.
    pub async fn acquire_timeout(&self, session_id: &str, timeout: Duration) -> SessionResult<LockGuard> {
        let start = tokio::time::Instant::now();

        loop {
            match self.try_acquire(session_id).await {
                Err(SessionError::LockContention) if start.elapsed() < timeout => {
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                result => return result,
            }
        }
    }
}

/// Held session lock. Release explicitly with [`release`](Self::release);
/// dropping the guard releases in a background task.
pub struct LockGuard {
    adapter: CacheAdapter,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    /// The lock's cache key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock if this guard still owns it.
    pub async fn release(mut self) -> SessionResult<()> {
        self.released = true;
        release(&self.adapter, &self.key, &self.token).await
    }
}

async fn release(adapter: &CacheAdapter, key: &str, token: &str) -> SessionResult<()> {
    if adapter.delete_if_eq(key, token.as_bytes()).await? {
        debug!("released session lock"; key = redact(key));
    } else {
        warn!("session lock expired before release"; key = redact(key));
    }
    Ok(())
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("session lock dropped outside a runtime; relying on TTL"; key = redact(&self.key));
            return;
        };

        let adapter = self.adapter.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = release(&adapter, &key, &token).await {
                warn!("background lock release failed"; key = redact(&key), error = e);
            }
        });
    }
}
