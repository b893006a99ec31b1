//! Session lifecycle management.

use crate::adapter::CacheAdapter;
use crate::config::{ComplianceConfig, CookieConfig, SessionManagerConfig};
use crate::cookie::{find_cookie, path_matches, set_cookie_header};
use crate::entity::{Session, SessionData, now};
use crate::error::{SessionError, SessionResult};
use crate::lock::CacheLock;
use crate::signing::CookieSigner;
use crate::token::{authenticate_security_token, generate_security_token, refresh_security_token};
use http::HeaderValue;
use http::header::SET_COOKIE;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wicket_cache::CacheStore;
use wicket_log::{debug, info, redact, warn};

const OLD_SESSION_DELETE_ATTEMPTS: u32 = 3;
const OLD_SESSION_DELETE_BACKOFF: Duration = Duration::from_millis(100);

/// Creates, loads and retires sessions stored in a cache.
///
/// All methods take `&self`; share a manager between tasks with `Arc`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use wicket_cache::InMemoryCache;
/// use wicket_session::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> SessionResult<()> {
/// let manager = SessionManager::new(
///     Arc::new(InMemoryCache::new()),
///     SessionManagerConfig::new("signing-key", "token-key"),
/// )?;
///
/// let mut session = manager.create(Duration::from_secs(1800)).await?;
/// session.set("user_id", &42)?;
/// manager.save(&session).await?;
///
/// let loaded = manager.get(session.id()).await?;
/// assert_eq!(loaded.get_as::<u32>("user_id")?, Some(42));
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    adapter: CacheAdapter,
    lock: CacheLock,
    signer: CookieSigner,
    token_key: Vec<u8>,
    cookie: CookieConfig,
    compliance: RwLock<Arc<ComplianceConfig>>,
    regenerate_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Create a manager over `cache`.
    ///
    /// Fails with [`SessionError::Config`] on empty keys or cookie
    /// attributes that cannot be rendered.
    pub fn new(cache: Arc<dyn CacheStore>, config: SessionManagerConfig) -> SessionResult<Self> {
        config.validate()?;

        let SessionManagerConfig {
            signing_key,
            security_token_key,
            cookie,
            compliance,
        } = config;

        debug!("session manager ready"; cookie = cookie.name, path = cookie.path);
        let adapter = CacheAdapter::new(cache);
        Ok(Self {
            lock: CacheLock::new(adapter.clone()),
            adapter,
            signer: CookieSigner::new(signing_key),
            token_key: security_token_key,
            cookie,
            compliance: RwLock::new(Arc::new(compliance)),
            regenerate_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Create a manager configured from `WICKET_SESSION_*` variables.
    pub fn from_env(cache: Arc<dyn CacheStore>) -> SessionResult<Self> {
        Self::new(cache, SessionManagerConfig::from_env()?)
    }

    // ===== Accessors =====

    /// The persistence adapter.
    pub fn adapter(&self) -> &CacheAdapter {
        &self.adapter
    }

    /// The cookie signer.
    pub fn signer(&self) -> &CookieSigner {
        &self.signer
    }

    /// Cookie attributes.
    pub fn cookie_config(&self) -> &CookieConfig {
        &self.cookie
    }

    /// Snapshot of the current lifetime policy.
    pub fn compliance(&self) -> Arc<ComplianceConfig> {
        self.compliance.read().clone()
    }

    /// Replace the lifetime policy. Calls already in flight keep the
    /// snapshot they started with.
    pub fn reconfigure(&self, compliance: ComplianceConfig) {
        info!(
            "compliance policy updated";
            max_session_ms = compliance.max_session_duration.as_millis(),
            inactivity_ms = compliance.inactivity_timeout.as_millis(),
            password_change_refresh = compliance.password_change_refresh
        );
        *self.compliance.write() = Arc::new(compliance);
    }

    // ===== Lifecycle =====

    /// Create and persist a session that lives for `duration`.
    pub async fn create(&self, duration: Duration) -> SessionResult<SessionData> {
        let id = Uuid::new_v4().to_string();
        let token = generate_security_token(&self.token_key);
        let session = SessionData::new(id.clone(), token, duration);

        self.adapter.set(&id, Some(&session), duration).await?;
        info!("session created"; session = redact(&id), ttl_secs = duration.as_secs());
        Ok(session)
    }

    /// Load a session and record the access.
    ///
    /// An idle session past the inactivity timeout is deleted and reported
    /// as [`SessionError::InactivityExpired`]; later lookups see
    /// [`SessionError::NotFound`].
    pub async fn get(&self, id: &str) -> SessionResult<SessionData> {
        let Some(mut session) = self.adapter.get(id).await? else {
            return Err(SessionError::NotFound);
        };

        let now = now();
        let policy = self.compliance();
        if !policy.inactivity_timeout.is_zero() && session.idle_for(now) > policy.inactivity_timeout {
            self.destroy(id).await?;
            info!("session expired due to inactivity"; session = redact(id));
            return Err(SessionError::InactivityExpired);
        }

        // the cache may not have evicted it yet
        if session.is_expired_at(now) {
            self.destroy(id).await?;
            return Err(SessionError::NotFound);
        }

        session.touch();
        self.persist(&session).await?;
        Ok(session)
    }

    /// Persist a modified session for the rest of its lifetime.
    pub async fn save(&self, session: &SessionData) -> SessionResult<()> {
        self.persist(session).await
    }

    async fn persist(&self, session: &SessionData) -> SessionResult<()> {
        let ttl = session.remaining();
        if ttl.is_zero() {
            self.adapter.delete(session.id()).await;
            return Err(SessionError::NotFound);
        }
        self.adapter.set(session.id(), Some(session), ttl).await
    }

    /// Delete a session. Deleting a missing session succeeds.
    pub async fn destroy(&self, id: &str) -> SessionResult<()> {
        self.adapter.try_delete(id).await?;
        debug!("session destroyed"; session = redact(id));
        Ok(())
    }

    /// Extend a session to `now + duration`, bounded by
    /// `max_session_duration`.
    pub async fn refresh(&self, id: &str, duration: Duration) -> SessionResult<SessionData> {
        let mut session = self.get(id).await?;
        let duration = self.compliance().clamp_duration(duration);

        session.renew(duration);
        self.adapter.set(id, Some(&session), duration).await?;
        debug!("session refreshed"; session = redact(id), ttl_secs = duration.as_secs());
        Ok(session)
    }

    /// Move a session's data to a fresh id and token, retiring the old id.
    ///
    /// Serialized per process and, through a cache lock on the old id,
    /// across processes. A concurrent regeneration of the same session
    /// fails with [`SessionError::LockContention`].
    pub async fn regenerate_session_id(&self, old_id: &str) -> SessionResult<String> {
        let _local = self.regenerate_lock.lock().await;
        let guard = self.lock.try_acquire(old_id).await?;

        let result = self.regenerate_locked(old_id).await;

        if let Err(e) = guard.release().await {
            warn!("failed to release session lock"; session = redact(old_id), error = e);
        }
        result
    }

    async fn regenerate_locked(&self, old_id: &str) -> SessionResult<String> {
        let old = self.get(old_id).await?;

        let new_id = Uuid::new_v4().to_string();
        let token = generate_security_token(&self.token_key);
        let mut replacement = SessionData::new(new_id.clone(), token, old.remaining());
        replacement.expiration = old.expiration;
        replacement.data = old.data;

        self.persist(&replacement).await?;
        self.delete_with_retry(old_id).await;

        info!(
            "session id regenerated";
            old = redact(old_id),
            new = redact(&new_id)
        );
        Ok(new_id)
    }

    async fn delete_with_retry(&self, id: &str) {
        for attempt in 1..=OLD_SESSION_DELETE_ATTEMPTS {
            match self.adapter.try_delete(id).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        "old session delete failed";
                        session = redact(id),
                        attempt = attempt,
                        error = e
                    );
                    if attempt < OLD_SESSION_DELETE_ATTEMPTS {
                        tokio::time::sleep(OLD_SESSION_DELETE_BACKOFF).await;
                    }
                }
            }
        }
        warn!("old session outlived regeneration"; session = redact(id));
    }

    // ===== HTTP =====

    /// Load the session named by the request's signed cookie.
    pub async fn get_from_request<B>(&self, request: &http::Request<B>) -> SessionResult<SessionData> {
        let value =
            find_cookie(request.headers(), &self.cookie.name).ok_or(SessionError::CookieNotFound)?;

        let request_path = request.uri().path();
        if !path_matches(request_path, &self.cookie.path) {
            return Err(SessionError::PathMismatch {
                request_path: request_path.to_string(),
                cookie_path: self.cookie.path.clone(),
            });
        }

        let id = self
            .signer
            .verify(value)
            .ok_or(SessionError::InvalidSignature)?;
        self.get(&id).await
    }

    /// Signed cookie value for a session.
    pub fn cookie_value(&self, session: &impl Session) -> String {
        self.signer.sign(session.id())
    }

    /// Append the session cookie to a response.
    pub fn set_to_response<B>(
        &self,
        response: &mut http::Response<B>,
        session: &impl Session,
    ) -> SessionResult<()> {
        let header = set_cookie_header(
            &self.cookie,
            &self.cookie_value(session),
            Some(session.expire_at()),
        );
        let value = HeaderValue::from_str(&header)
            .map_err(|e| SessionError::Config(format!("unrenderable Set-Cookie header: {}", e)))?;
        response.headers_mut().append(SET_COOKIE, value);
        Ok(())
    }

    // ===== Security tokens =====

    /// Check a token presented by the client against the session's token.
    ///
    /// The comparison is constant-time and the token's tag must verify.
    /// Freshness is not required: the stored token lives as long as the
    /// session, so use [`rotate_security_token`](Self::rotate_security_token)
    /// to replace it.
    pub fn verify_security_token(&self, session: &SessionData, presented: &str) -> bool {
        constant_time_eq(session.security_token().as_bytes(), presented.as_bytes())
            && authenticate_security_token(presented, &self.token_key).is_some()
    }

    /// Give the session a fresh security token unless the stored one was
    /// issued moments ago, returning the token now in effect.
    ///
    /// A stored token is kept only while it still validates, that is within
    /// [`MAX_CLOCK_DRIFT_SECS`](crate::token::MAX_CLOCK_DRIFT_SECS) of its
    /// issue time. Anything older, or a token that fails authentication, is
    /// replaced with a newly generated one and persisted. The refresh
    /// cooldown is longer than that window, so it never holds a token back.
    pub async fn rotate_security_token(&self, id: &str) -> SessionResult<String> {
        let mut session = self.get(id).await?;

        let next = match refresh_security_token(session.security_token(), &self.token_key) {
            Ok(token) => token,
            Err(SessionError::InvalidToken) => generate_security_token(&self.token_key),
            Err(e) => return Err(e),
        };

        if next != session.security_token {
            session.security_token = next.clone();
            self.persist(&session).await?;
            debug!("security token rotated"; session = redact(id));
        }
        Ok(next)
    }

    /// Apply the password-change policy, returning the id the client should
    /// use from now on.
    pub async fn on_password_change(&self, id: &str) -> SessionResult<String> {
        if self.compliance().password_change_refresh {
            return self.regenerate_session_id(id).await;
        }
        self.get(id).await?;
        Ok(id.to_string())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("cookie", &self.cookie)
            .field("compliance", &self.compliance())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SameSite;
    use crate::lock::lock_key;
    use crate::value::Value;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wicket_cache::{AddError, CacheError, CacheResult, InMemoryCache};

    const HOUR: Duration = Duration::from_secs(3600);

    /// Fails the first `failures` plain deletes with a connection error.
    struct FlakyDeleteCache {
        inner: InMemoryCache,
        failures: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl FlakyDeleteCache {
        fn new(failures: usize) -> Self {
            Self {
                inner: InMemoryCache::new(),
                failures: AtomicUsize::new(failures),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CacheStore for FlakyDeleteCache {
        async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> CacheResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(CacheError::Connection("connection reset".to_string()));
            }
            self.inner.delete(key).await
        }

        async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
            self.inner.delete_if_eq(key, expected).await
        }

        async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), AddError> {
            self.inner.add(key, value, ttl).await
        }

        async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
            self.inner.ttl(key).await
        }

        async fn clear(&self) -> CacheResult<()> {
            self.inner.clear().await
        }
    }

    fn flaky_manager(failures: usize) -> (Arc<FlakyDeleteCache>, SessionManager) {
        let cache = Arc::new(FlakyDeleteCache::new(failures));
        let manager =
            SessionManager::new(cache.clone(), SessionManagerConfig::new("sign", "token")).unwrap();
        (cache, manager)
    }

    fn manager_with(config: SessionManagerConfig) -> (Arc<InMemoryCache>, SessionManager) {
        let cache = Arc::new(InMemoryCache::new());
        let manager = SessionManager::new(cache.clone(), config).unwrap();
        (cache, manager)
    }

    fn manager() -> (Arc<InMemoryCache>, SessionManager) {
        manager_with(SessionManagerConfig::new("sign", "token"))
    }

    fn request_with_cookie(path: &str, cookie: &str) -> http::Request<()> {
        http::Request::builder()
            .uri(path)
            .header(http::header::COOKIE, cookie)
            .body(())
            .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
        assert!(matches!(
            SessionManager::new(cache.clone(), SessionManagerConfig::new("", "t")),
            Err(SessionError::Config(_))
        ));
        let bad_cookie = SessionManagerConfig::new("s", "t")
            .with_cookie(CookieConfig::default().with_name("bad name"));
        assert!(SessionManager::new(cache, bad_cookie).is_err());
    }

    #[tokio::test]
    async fn test_create_get_round_trip() {
        let (_, manager) = manager();
        let created = manager.create(HOUR).await.unwrap();
        assert!(!created.security_token().is_empty());

        let loaded = manager.get(created.id()).await.unwrap();
        assert_eq!(loaded.id(), created.id());
        assert_eq!(loaded.security_token(), created.security_token());
        assert_eq!(loaded.expire_at(), created.expire_at());
        assert!(loaded.last_active() >= created.last_active());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (_, manager) = manager();
        assert!(matches!(
            manager.get("nope").await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_logically_expired_record_is_not_found() {
        let (cache, manager) = manager();
        let mut session = manager.create(HOUR).await.unwrap();
        session.expiration = now() - chrono::Duration::seconds(1);
        let bytes = bincode::serde::encode_to_vec(&session, bincode::config::standard()).unwrap();
        cache.set(session.id(), bytes, None).await.unwrap();

        assert!(matches!(
            manager.get(session.id()).await,
            Err(SessionError::NotFound)
        ));
        assert!(!cache.exists(session.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_inactivity_eviction() {
        let (cache, manager) = manager();
        manager.reconfigure(ComplianceConfig::new().with_inactivity_timeout(Duration::from_secs(60)));

        let mut session = manager.create(HOUR).await.unwrap();
        session.last_active = now() - chrono::Duration::seconds(120);
        manager.adapter().set(session.id(), Some(&session), HOUR).await.unwrap();

        assert!(matches!(
            manager.get(session.id()).await,
            Err(SessionError::InactivityExpired)
        ));
        assert!(!cache.exists(session.id()).await.unwrap());
        assert!(matches!(
            manager.get(session.id()).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_refresh_clamps_to_max_duration() {
        let (_, manager) = manager_with(
            SessionManagerConfig::new("s", "t").with_compliance(
                ComplianceConfig::new().with_max_session_duration(Duration::from_secs(600)),
            ),
        );
        let session = manager.create(Duration::from_secs(60)).await.unwrap();

        let refreshed = manager.refresh(session.id(), HOUR).await.unwrap();
        assert!(refreshed.remaining() <= Duration::from_secs(600));
        assert!(refreshed.remaining() > Duration::from_secs(590));

        let stored = manager.adapter().get(session.id()).await.unwrap().unwrap();
        assert_eq!(stored.expire_at(), refreshed.expire_at());
    }

    #[tokio::test]
    async fn test_regenerate_moves_data() {
        let (cache, manager) = manager();
        let mut session = manager.create(HOUR).await.unwrap();
        session.set("cart", &vec!["apple", "pear"]).unwrap();
        manager.save(&session).await.unwrap();

        let new_id = manager.regenerate_session_id(session.id()).await.unwrap();
        assert_ne!(new_id, session.id());

        let moved = manager.get(&new_id).await.unwrap();
        assert_eq!(
            moved.get_as::<Vec<String>>("cart").unwrap(),
            Some(vec!["apple".to_string(), "pear".to_string()])
        );
        assert_ne!(moved.security_token(), session.security_token());
        assert!(moved.expire_at() <= session.expire_at());

        assert!(matches!(
            manager.get(session.id()).await,
            Err(SessionError::NotFound)
        ));
        assert!(!cache.exists(&lock_key(session.id())).await.unwrap());
    }

    #[tokio::test]
    async fn test_regenerate_under_contention() {
        let (cache, manager) = manager();
        let session = manager.create(HOUR).await.unwrap();
        cache
            .add(&lock_key(session.id()), b"other".to_vec(), None)
            .await
            .unwrap();

        assert!(matches!(
            manager.regenerate_session_id(session.id()).await,
            Err(SessionError::LockContention)
        ));
        // the session is untouched
        manager.get(session.id()).await.unwrap();
    }

    #[tokio::test]
    async fn test_regenerate_missing_releases_lock() {
        let (cache, manager) = manager();
        assert!(matches!(
            manager.regenerate_session_id("ghost").await,
            Err(SessionError::NotFound)
        ));
        assert!(!cache.exists(&lock_key("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn test_request_response_cycle() {
        let (_, manager) = manager();
        let session = manager.create(HOUR).await.unwrap();

        let mut response = http::Response::new(());
        manager.set_to_response(&mut response, &session).unwrap();
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("hyy_session_id="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Expires="));

        let pair = set_cookie.split(';').next().unwrap();
        let request = request_with_cookie("/dashboard", pair);
        let loaded = manager.get_from_request(&request).await.unwrap();
        assert_eq!(loaded.id(), session.id());
    }

    #[tokio::test]
    async fn test_request_failures() {
        let (_, manager) = manager_with(
            SessionManagerConfig::new("s", "t")
                .with_cookie(CookieConfig::default().with_path("/subpath")),
        );
        let session = manager.create(HOUR).await.unwrap();
        let cookie = format!("hyy_session_id={}", manager.cookie_value(&session));

        let no_cookie = http::Request::builder().uri("/subpath").body(()).unwrap();
        assert!(matches!(
            manager.get_from_request(&no_cookie).await,
            Err(SessionError::CookieNotFound)
        ));

        assert!(matches!(
            manager.get_from_request(&request_with_cookie("/other", &cookie)).await,
            Err(SessionError::PathMismatch { .. })
        ));

        let forged = format!("hyy_session_id={}.AAAA", session.id());
        assert!(matches!(
            manager.get_from_request(&request_with_cookie("/subpath/x", &forged)).await,
            Err(SessionError::InvalidSignature)
        ));

        manager
            .get_from_request(&request_with_cookie("/subpath/x", &cookie))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_same_site_strict_cookie() {
        let (_, manager) = manager_with(
            SessionManagerConfig::new("s", "t").with_cookie(
                CookieConfig::default()
                    .with_same_site(SameSite::Strict)
                    .with_session_only(true),
            ),
        );
        let session = manager.create(HOUR).await.unwrap();
        let mut response = http::Response::new(());
        manager.set_to_response(&mut response, &session).unwrap();

        let header = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(header.contains("SameSite=Strict"));
        assert!(!header.contains("Expires"));
    }

    #[tokio::test]
    async fn test_security_token_verification() {
        let (_, manager) = manager();
        let session = manager.create(HOUR).await.unwrap();
        let token = session.security_token().to_string();

        assert!(manager.verify_security_token(&session, &token));
        assert!(!manager.verify_security_token(&session, "forged"));

        let other = manager.create(HOUR).await.unwrap();
        assert!(!manager.verify_security_token(&session, other.security_token()));
    }

    #[tokio::test]
    async fn test_rotate_keeps_just_issued_token() {
        let (_, manager) = manager();
        let session = manager.create(HOUR).await.unwrap();
        let token = manager.rotate_security_token(session.id()).await.unwrap();
        assert_eq!(token, session.security_token());
    }

    #[tokio::test]
    async fn test_rotate_replaces_invalid_token() {
        let (_, manager) = manager();
        let mut session = manager.create(HOUR).await.unwrap();
        session.security_token = "stale".to_string();
        manager.save(&session).await.unwrap();

        let token = manager.rotate_security_token(session.id()).await.unwrap();
        assert_ne!(token, "stale");
        let stored = manager.get(session.id()).await.unwrap();
        assert_eq!(stored.security_token(), token);
        assert!(manager.verify_security_token(&stored, &token));
    }

    #[tokio::test]
    async fn test_rotate_replaces_authentic_token_past_drift_window() {
        let (_, manager) = manager();
        let mut session = manager.create(HOUR).await.unwrap();
        let issued = chrono::Utc::now() - chrono::Duration::seconds(60);
        session.security_token = crate::token::generate_security_token_at(b"token", issued);
        manager.save(&session).await.unwrap();

        let token = manager.rotate_security_token(session.id()).await.unwrap();
        assert_ne!(token, session.security_token());
        let stored = manager.get(session.id()).await.unwrap();
        assert_eq!(stored.security_token(), token);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_retries_failed_old_delete() {
        let (cache, manager) = flaky_manager(OLD_SESSION_DELETE_ATTEMPTS as usize - 1);
        let mut session = manager.create(HOUR).await.unwrap();
        session.insert("user", "ada");
        manager.save(&session).await.unwrap();

        let new_id = manager.regenerate_session_id(session.id()).await.unwrap();
        assert_eq!(
            cache.attempts.load(Ordering::SeqCst),
            OLD_SESSION_DELETE_ATTEMPTS as usize
        );

        assert!(matches!(
            manager.get(session.id()).await,
            Err(SessionError::NotFound)
        ));
        let mut moved = manager.get(&new_id).await.unwrap();
        assert_eq!(moved.get("user"), Some(&Value::from("ada")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_succeeds_when_old_delete_keeps_failing() {
        let (cache, manager) = flaky_manager(OLD_SESSION_DELETE_ATTEMPTS as usize);
        let session = manager.create(HOUR).await.unwrap();

        let new_id = manager.regenerate_session_id(session.id()).await.unwrap();
        assert_ne!(new_id, session.id());
        assert_eq!(
            cache.attempts.load(Ordering::SeqCst),
            OLD_SESSION_DELETE_ATTEMPTS as usize
        );

        // both records coexist until the old one expires
        manager.get(session.id()).await.unwrap();
        manager.get(&new_id).await.unwrap();
        assert!(!cache.exists(&lock_key(session.id())).await.unwrap());
    }

    #[tokio::test]
    async fn test_password_change_policy() {
        let (_, manager) = manager();
        let session = manager.create(HOUR).await.unwrap();
        assert_eq!(
            manager.on_password_change(session.id()).await.unwrap(),
            session.id()
        );

        manager.reconfigure(ComplianceConfig::new().with_password_change_refresh(true));
        let new_id = manager.on_password_change(session.id()).await.unwrap();
        assert_ne!(new_id, session.id());
        manager.get(&new_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (_, manager) = manager();
        let session = manager.create(HOUR).await.unwrap();
        manager.destroy(session.id()).await.unwrap();
        manager.destroy(session.id()).await.unwrap();
        assert!(matches!(
            manager.get(session.id()).await,
            Err(SessionError::NotFound)
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
