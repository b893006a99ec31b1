//! Server-side web sessions for wicket.
//!
//! Sessions live in a [`wicket_cache::CacheStore`] and are referenced from
//! the browser by a signed cookie. Each session carries a CSRF security
//! token.
//!
//! # Features
//!
//! - `redis` - Enable the Redis cache backend (enabled by default)
//!
//! ## Lifecycle
//!
//! - [`SessionManager::create`] mints an id and token and persists the record
//! - [`SessionManager::get`] / [`SessionManager::get_from_request`] load it,
//!   enforcing the inactivity timeout
//! - [`SessionManager::refresh`] extends it within `max_session_duration`
//! - [`SessionManager::regenerate_session_id`] moves it to a new id after a
//!   privilege change
//! - [`SessionManager::destroy`] removes it
//!
//! ## Cookie format
//!
//! `<session id>.<base64url(HMAC-SHA256(signing key, session id))>`. Cookies
//! are always `HttpOnly`; `Secure`, `SameSite`, path and domain come from
//! [`CookieConfig`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wicket_cache::InMemoryCache;
//! use wicket_session::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> SessionResult<()> {
//! let manager = SessionManager::new(
//!     Arc::new(InMemoryCache::new()),
//!     SessionManagerConfig::new("signing-key", "token-key"),
//! )?;
//!
//! // login
//! let mut session = manager.create(Duration::from_secs(1800)).await?;
//! session.insert("user_id", 7);
//! manager.save(&session).await?;
//!
//! let mut response = http::Response::new(());
//! manager.set_to_response(&mut response, &session)?;
//!
//! // next request
//! let cookie = manager.cookie_value(&session);
//! let request = http::Request::builder()
//!     .uri("/account")
//!     .header("cookie", format!("hyy_session_id={}", cookie))
//!     .body(())
//!     .unwrap();
//! let loaded = manager.get_from_request(&request).await?;
//! assert_eq!(loaded.get_as::<i64>("user_id")?, Some(7));
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod cookie;
pub mod entity;
pub mod error;
pub mod lock;
pub mod manager;
pub mod signing;
pub mod token;
pub mod value;

pub use adapter::CacheAdapter;
pub use config::{
    ComplianceConfig, CookieConfig, DEFAULT_COOKIE_NAME, DEFAULT_SESSION_DURATION, SameSite,
    SessionManagerConfig,
};
pub use entity::{Session, SessionData};
pub use error::{SessionError, SessionResult};
pub use lock::{CacheLock, LOCK_TTL, LockGuard};
pub use manager::SessionManager;
pub use signing::CookieSigner;
pub use token::{
    generate_security_token, refresh_security_token, validate_security_token,
};
pub use value::Value;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ComplianceConfig, CookieConfig, SameSite, SessionManagerConfig};
    pub use crate::entity::{Session, SessionData};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::manager::SessionManager;
    pub use crate::value::Value;
}
