//! Error types for session operations.

use thiserror::Error;
use wicket_cache::CacheError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No live session under this id
    #[error("Session not found")]
    NotFound,

    /// Session was idle longer than the inactivity timeout and has been removed
    #[error("Session expired due to inactivity")]
    InactivityExpired,

    /// The request carries no session cookie
    #[error("Session cookie not found")]
    CookieNotFound,

    /// The request path is outside the session cookie's path
    #[error("Request path {request_path} is outside cookie path {cookie_path}")]
    PathMismatch {
        request_path: String,
        cookie_path: String,
    },

    /// Cookie value failed signature verification
    #[error("Invalid session signature")]
    InvalidSignature,

    /// Stored record does not belong to the key it was found under
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Another holder owns the session lock
    #[error("Session is locked by another operation")]
    LockContention,

    /// Encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Security token failed validation
    #[error("Invalid security token")]
    InvalidToken,

    /// Cache backend failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether the client should be treated as having no session.
    ///
    /// True for every outcome that means "start over with a fresh session"
    /// rather than a backend failure.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            SessionError::NotFound
                | SessionError::InactivityExpired
                | SessionError::CookieNotFound
                | SessionError::PathMismatch { .. }
                | SessionError::InvalidSignature
        )
    }
}

impl From<bincode::error::EncodeError> for SessionError {
    fn from(e: bincode::error::EncodeError) -> Self {
        SessionError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for SessionError {
    fn from(e: bincode::error::DecodeError) -> Self {
        SessionError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization(e.to_string())
    }
}
