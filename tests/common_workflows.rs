//! Integration tests for common wicket workflows.
//!
//! These tests drive the facade the way a web application would: log in,
//! hand out a cookie, read it back on later requests, escalate privileges
//! and log out.

use std::sync::Arc;
use std::time::Duration;
use wicket::cache::{CacheConfig, CacheStore, InMemoryCache, TieredCache};
use wicket::prelude::*;

// =============================================================================
// Helpers
// =============================================================================

async fn memory_manager() -> SessionManager {
    wicket::connect(
        CacheConfig::memory(),
        SessionManagerConfig::new("workflow-signing", "workflow-token"),
    )
    .await
    .unwrap()
}

fn cookie_pair(response: &http::Response<()>) -> String {
    response
        .headers()
        .get(http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn request(path: &str, cookie: &str) -> http::Request<()> {
    http::Request::builder()
        .uri(path)
        .header(http::header::COOKIE, cookie)
        .body(())
        .unwrap()
}

// =============================================================================
// Login / Logout
// =============================================================================

#[tokio::test]
async fn test_login_request_logout() {
    let manager = memory_manager().await;

    // login
    let mut session = manager.create(Duration::from_secs(1800)).await.unwrap();
    session.set("user_id", &1001).unwrap();
    manager.save(&session).await.unwrap();

    let mut response = http::Response::new(());
    manager.set_to_response(&mut response, &session).unwrap();
    let cookie = cookie_pair(&response);

    // authenticated request, with an unrelated cookie alongside
    let req = request("/account", &format!("theme=dark; {}", cookie));
    let loaded = manager.get_from_request(&req).await.unwrap();
    assert_eq!(loaded.get_as::<u32>("user_id").unwrap(), Some(1001));

    // logout
    manager.destroy(loaded.id()).await.unwrap();
    let err = manager.get_from_request(&req).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
    assert!(err.is_unauthenticated());
}

#[tokio::test]
async fn test_privilege_escalation_rotates_cookie() {
    let manager = memory_manager().await;
    let mut session = manager.create(Duration::from_secs(1800)).await.unwrap();
    session.insert("cart", vec![Value::from("book"), Value::from(2)]);
    manager.save(&session).await.unwrap();

    let mut before = http::Response::new(());
    manager.set_to_response(&mut before, &session).unwrap();
    let old_cookie = cookie_pair(&before);

    // user signs in: move the anonymous session to a fresh id
    let new_id = manager.regenerate_session_id(session.id()).await.unwrap();
    let upgraded = manager.get(&new_id).await.unwrap();

    let mut after = http::Response::new(());
    manager.set_to_response(&mut after, &upgraded).unwrap();
    let new_cookie = cookie_pair(&after);
    assert_ne!(old_cookie, new_cookie);

    assert!(matches!(
        manager.get_from_request(&request("/", &old_cookie)).await,
        Err(SessionError::NotFound)
    ));
    let mut loaded = manager
        .get_from_request(&request("/", &new_cookie))
        .await
        .unwrap();
    assert_eq!(
        loaded.get("cart"),
        Some(&Value::List(vec![Value::from("book"), Value::from(2)]))
    );
}

// =============================================================================
// CSRF
// =============================================================================

#[tokio::test]
async fn test_csrf_token_round_trip() {
    let manager = memory_manager().await;
    let session = manager.create(Duration::from_secs(1800)).await.unwrap();

    // token rendered into a form and posted back
    let form_token = session.security_token().to_string();
    let loaded = manager.get(session.id()).await.unwrap();
    assert!(manager.verify_security_token(&loaded, &form_token));

    let other = manager.create(Duration::from_secs(1800)).await.unwrap();
    assert!(!manager.verify_security_token(&loaded, other.security_token()));
}

// =============================================================================
// Backends
// =============================================================================

#[tokio::test]
async fn test_file_backend_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let manager = wicket::connect(
        CacheConfig::file(dir.path()),
        SessionManagerConfig::new("workflow-signing", "workflow-token"),
    )
    .await
    .unwrap();

    let mut session = manager.create(Duration::from_secs(60)).await.unwrap();
    session.insert("k", "v");
    manager.save(&session).await.unwrap();

    let mut loaded = manager.get(session.id()).await.unwrap();
    assert_eq!(loaded.get("k"), Some(&Value::from("v")));
}

#[tokio::test]
async fn test_tiered_backend_workflow() {
    let l1 = Arc::new(InMemoryCache::new());
    let l2 = Arc::new(InMemoryCache::new());
    let tiered: Arc<dyn CacheStore> = Arc::new(TieredCache::new(l1, l2.clone()));
    let manager = SessionManager::new(
        tiered,
        SessionManagerConfig::new("workflow-signing", "workflow-token"),
    )
    .unwrap();

    let session = manager.create(Duration::from_secs(60)).await.unwrap();
    assert!(l2.exists(session.id()).await.unwrap());

    let new_id = manager.regenerate_session_id(session.id()).await.unwrap();
    assert!(l2.exists(&new_id).await.unwrap());
    assert!(!l2.exists(session.id()).await.unwrap());
}

#[tokio::test]
async fn test_connect_rejects_bad_session_config() {
    let err = wicket::connect(
        CacheConfig::memory(),
        SessionManagerConfig::new("", "token"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SessionError::Config(_)));
}

// =============================================================================
// Compliance
// =============================================================================

#[tokio::test]
async fn test_password_change_forces_new_id() {
    let manager = wicket::connect(
        CacheConfig::memory(),
        SessionManagerConfig::new("workflow-signing", "workflow-token").with_compliance(
            ComplianceConfig::new()
                .with_password_change_refresh(true)
                .with_max_session_duration(Duration::from_secs(4 * 3600))
                .with_inactivity_timeout(Duration::from_secs(60)),
        ),
    )
    .await
    .unwrap();

    let session = manager.create(Duration::from_secs(1800)).await.unwrap();
    let new_id = manager.on_password_change(session.id()).await.unwrap();
    assert_ne!(new_id, session.id());

    let refreshed = manager
        .refresh(&new_id, Duration::from_secs(24 * 3600))
        .await
        .unwrap();
    assert!(refreshed.remaining() <= Duration::from_secs(4 * 3600));
}
