//! Session persistence over a byte cache.

use crate::entity::SessionData;
use crate::error::{SessionError, SessionResult};
use std::sync::Arc;
use std::time::Duration;
use wicket_cache::{AddError, CacheResult, CacheStore};
use wicket_log::{debug, redact, warn};

/// Encodes [`SessionData`] records into a [`CacheStore`].
///
/// Records are stored under their session id. A zero-length value is a
/// tombstone and reads as "no session".
#[derive(Clone)]
pub struct CacheAdapter {
    cache: Arc<dyn CacheStore>,
}

impl CacheAdapter {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// The underlying store.
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Load a session record.
    ///
    /// Returns `Ok(None)` for a missing key or a tombstone.
    pub async fn get(&self, id: &str) -> SessionResult<Option<SessionData>> {
        let Some(bytes) = self.cache.get(id).await? else {
            return Ok(None);
        };
        if bytes.is_empty() {
            debug!("tombstone hit"; session = redact(id));
            return Ok(None);
        }

        let (data, read): (SessionData, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        if read != bytes.len() {
            return Err(SessionError::Serialization(format!(
                "{} trailing bytes after session record",
                bytes.len() - read
            )));
        }

        check_owner(id, &data)?;
        Ok(Some(data))
    }

    /// Store a session record, or a tombstone when `data` is `None`.
    pub async fn set(&self, id: &str, data: Option<&SessionData>, ttl: Duration) -> SessionResult<()> {
        let bytes = match data {
            Some(data) => {
                check_owner(id, data)?;
                bincode::serde::encode_to_vec(data, bincode::config::standard())?
            }
            None => Vec::new(),
        };
        self.cache.set(id, bytes, Some(ttl)).await?;
        Ok(())
    }

    /// Remove a record. Failures are logged, never returned.
    pub async fn delete(&self, id: &str) {
        if let Err(e) = self.cache.delete(id).await {
            warn!("session delete failed"; session = redact(id), error = e);
        }
    }

    /// Remove a record, surfacing backend errors.
    pub async fn try_delete(&self, id: &str) -> CacheResult<()> {
        self.cache.delete(id).await
    }

    /// Atomically create `key` if absent.
    pub async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), AddError> {
        self.cache.add(key, value, Some(ttl)).await
    }

    /// Remove `key` only while it still holds `expected`.
    pub async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        self.cache.delete_if_eq(key, expected).await
    }
}

fn check_owner(id: &str, data: &SessionData) -> SessionResult<()> {
    if data.session_id.is_empty() {
        return Err(SessionError::TypeMismatch(
            "session record has no id".to_string(),
        ));
    }
    if data.session_id != id {
        return Err(SessionError::TypeMismatch(format!(
            "record for {} stored under {}",
            redact(&data.session_id),
            redact(id)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Session;
    use wicket_cache::InMemoryCache;

    fn adapter() -> (Arc<InMemoryCache>, CacheAdapter) {
        let cache = Arc::new(InMemoryCache::new());
        (cache.clone(), CacheAdapter::new(cache))
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_round_trip() {
        let (_, adapter) = adapter();
        let mut data = SessionData::new("abc", "tok", TTL);
        data.insert("n", 7);

        adapter.set("abc", Some(&data), TTL).await.unwrap();
        assert_eq!(adapter.get("abc").await.unwrap(), Some(data));
        assert_eq!(adapter.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tombstone_reads_as_missing() {
        let (cache, adapter) = adapter();
        adapter.set("abc", None, TTL).await.unwrap();
        assert_eq!(cache.get("abc").await.unwrap(), Some(Vec::new()));
        assert_eq!(adapter.get("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_garbage_is_serialization_error() {
        let (cache, adapter) = adapter();
        cache
            .set("abc", b"invalid binary data".to_vec(), None)
            .await
            .unwrap();
        assert!(matches!(
            adapter.get("abc").await,
            Err(SessionError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_trailing_bytes_rejected() {
        let (cache, adapter) = adapter();
        let data = SessionData::new("abc", "tok", TTL);
        let mut bytes = bincode::serde::encode_to_vec(&data, bincode::config::standard()).unwrap();
        bytes.push(0);
        cache.set("abc", bytes, None).await.unwrap();

        assert!(matches!(
            adapter.get("abc").await,
            Err(SessionError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_mismatch() {
        let (cache, adapter) = adapter();
        let data = SessionData::new("abc", "tok", TTL);

        assert!(matches!(
            adapter.set("xyz", Some(&data), TTL).await,
            Err(SessionError::TypeMismatch(_))
        ));

        let bytes = bincode::serde::encode_to_vec(&data, bincode::config::standard()).unwrap();
        cache.set("xyz", bytes, None).await.unwrap();
        assert!(matches!(
            adapter.get("xyz").await,
            Err(SessionError::TypeMismatch(_))
        ));

        let anonymous = SessionData::new("", "tok", TTL);
        assert!(matches!(
            adapter.set("", Some(&anonymous), TTL).await,
            Err(SessionError::TypeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, adapter) = adapter();
        let data = SessionData::new("abc", "tok", TTL);
        adapter.set("abc", Some(&data), TTL).await.unwrap();

        adapter.delete("abc").await;
        adapter.delete("abc").await;
        adapter.try_delete("abc").await.unwrap();
        assert_eq!(adapter.get("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_reports_existing_key() {
        let (_, adapter) = adapter();
        adapter.add("lock:abc", b"a".to_vec(), TTL).await.unwrap();
        let err = adapter.add("lock:abc", b"b".to_vec(), TTL).await.unwrap_err();
        assert!(err.is_already_exists());

        assert!(!adapter.delete_if_eq("lock:abc", b"b").await.unwrap());
        assert!(adapter.delete_if_eq("lock:abc", b"a").await.unwrap());
        adapter.add("lock:abc", b"b".to_vec(), TTL).await.unwrap();
    }
}
