//! The session entity.

use crate::error::{SessionError, SessionResult};
use crate::value::Value;
use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

mod sealed {
    pub trait Sealed {}
}

/// Current time at the precision sessions are persisted with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn after(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
    start.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Behavior shared by session handles.
///
/// Sealed; [`SessionData`] is the only implementation. Every mutator and
/// [`get`](Session::get) refreshes the last-activity time; [`id`](Session::id)
/// and [`expire_at`](Session::expire_at) do not.
pub trait Session: sealed::Sealed + Send + Sync {
    /// The session id.
    fn id(&self) -> &str;

    /// Read a value.
    fn get(&mut self, key: &str) -> Option<&Value>;

    /// Store any serializable value.
    fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> SessionResult<()>
    where
        Self: Sized;

    /// Store a value that already converts into [`Value`].
    fn insert(&mut self, key: &str, value: impl Into<Value>)
    where
        Self: Sized;

    /// Remove a value, returning it if present.
    fn delete(&mut self, key: &str) -> Option<Value>;

    /// Absolute expiration time.
    fn expire_at(&self) -> DateTime<Utc>;

    /// Push the expiration to `now + duration`.
    fn renew(&mut self, duration: Duration);

    /// Record activity.
    fn touch(&mut self);

    /// No-op; removal from storage is done through the manager.
    fn destroy(&mut self) {}
}

/// Server-side session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub(crate) session_id: String,
    pub(crate) security_token: String,
    pub(crate) data: HashMap<String, Value>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub(crate) expiration: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub(crate) last_active: DateTime<Utc>,
}

impl SessionData {
    /// Create a record that expires `duration` from now.
    pub fn new(session_id: impl Into<String>, security_token: impl Into<String>, duration: Duration) -> Self {
        let now = now();
        Self {
            session_id: session_id.into(),
            security_token: security_token.into(),
            data: HashMap::new(),
            expiration: after(now, duration),
            last_active: now,
        }
    }

    /// Read and deserialize a value without touching the session.
    ///
    /// `Ok(None)` if the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        self.data
            .get(key)
            .map(|v| v.deserialize_into().map_err(SessionError::from))
            .transpose()
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// All keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time of the last recorded activity.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// The session's CSRF token.
    pub fn security_token(&self) -> &str {
        &self.security_token
    }

    /// Time left until expiration, zero if already past.
    pub fn remaining(&self) -> Duration {
        (self.expiration - now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub(crate) fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expiration <= at
    }

    pub(crate) fn idle_for(&self, at: DateTime<Utc>) -> Duration {
        (at - self.last_active).to_std().unwrap_or(Duration::ZERO)
    }
}

impl sealed::Sealed for SessionData {}

impl Session for SessionData {
    fn id(&self) -> &str {
        &self.session_id
    }

    fn get(&mut self, key: &str) -> Option<&Value> {
        self.touch();
        self.data.get(key)
    }

    fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> SessionResult<()> {
        let value = Value::from_serialize(value)?;
        self.data.insert(key.to_string(), value);
        self.touch();
        Ok(())
    }

    fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.data.insert(key.to_string(), value.into());
        self.touch();
    }

    fn delete(&mut self, key: &str) -> Option<Value> {
        self.touch();
        self.data.remove(key)
    }

    fn expire_at(&self) -> DateTime<Utc> {
        self.expiration
    }

    fn renew(&mut self, duration: Duration) {
        let now = now();
        self.expiration = after(now, duration);
        self.last_active = now;
    }

    fn touch(&mut self) {
        self.last_active = now();
    }
}
