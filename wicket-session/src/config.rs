//! Session manager configuration.

use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session lifetime used when the caller has no preference.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(30 * 60);

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "hyy_session_id";

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl std::str::FromStr for SameSite {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(SessionError::Config(format!("unknown SameSite mode '{}'", other))),
        }
    }
}

/// Session lifetime policy.
///
/// A zero duration disables the corresponding bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Upper bound applied to `refresh` durations
    #[serde(with = "duration_ms", default)]
    pub max_session_duration: Duration,

    /// Idle time after which a session is evicted on access
    #[serde(with = "duration_ms", default)]
    pub inactivity_timeout: Duration,

    /// Regenerate the session id when the user's password changes
    #[serde(default)]
    pub password_change_refresh: bool,
}

impl ComplianceConfig {
    /// Create a policy with every bound disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum session duration.
    pub fn with_max_session_duration(mut self, duration: Duration) -> Self {
        self.max_session_duration = duration;
        self
    }

    /// Set the inactivity timeout.
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Enable or disable id regeneration on password change.
    pub fn with_password_change_refresh(mut self, enabled: bool) -> Self {
        self.password_change_refresh = enabled;
        self
    }

    /// Clamp a requested duration to `max_session_duration`.
    pub fn clamp_duration(&self, requested: Duration) -> Duration {
        if self.max_session_duration.is_zero() {
            requested
        } else {
            requested.min(self.max_session_duration)
        }
    }
}

/// Attributes of the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieConfig {
    /// Cookie name
    pub name: String,

    /// Cookie path; requests outside it carry no session
    pub path: String,

    /// Cookie domain
    #[serde(default)]
    pub domain: Option<String>,

    /// Only send over HTTPS
    pub secure: bool,

    /// SameSite policy
    #[serde(default)]
    pub same_site: SameSite,

    /// Omit `Expires` so the cookie dies with the browser session
    #[serde(default)]
    pub session_only: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            path: "/".to_string(),
            domain: None,
            secure: true,
            same_site: SameSite::Lax,
            session_only: false,
        }
    }
}

impl CookieConfig {
    /// Set the cookie name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the cookie path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the cookie domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the Secure flag.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the SameSite policy.
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Make the cookie browser-session scoped.
    pub fn with_session_only(mut self, session_only: bool) -> Self {
        self.session_only = session_only;
        self
    }

    /// Reject names and paths that cannot appear in a `Set-Cookie` header.
    pub fn validate(&self) -> SessionResult<()> {
        let name_ok = !self.name.is_empty()
            && self.name.bytes().all(|b| {
                b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
            });
        if !name_ok {
            return Err(SessionError::Config(format!(
                "invalid cookie name '{}'",
                self.name
            )));
        }

        let attr_ok = |s: &str| s.bytes().all(|b| (0x20..0x7f).contains(&b) && b != b';');
        if !self.path.is_empty() && (!self.path.starts_with('/') || !attr_ok(&self.path)) {
            return Err(SessionError::Config(format!(
                "invalid cookie path '{}'",
                self.path
            )));
        }
        if let Some(domain) = &self.domain
            && (domain.is_empty() || !attr_ok(domain))
        {
            return Err(SessionError::Config(format!(
                "invalid cookie domain '{}'",
                domain
            )));
        }
        Ok(())
    }
}

/// Everything needed to build a [`SessionManager`](crate::SessionManager).
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionManagerConfig {
    /// Key for cookie signatures
    pub signing_key: Vec<u8>,

    /// Key for security token tags
    pub security_token_key: Vec<u8>,

    /// Cookie attributes
    #[serde(default)]
    pub cookie: CookieConfig,

    /// Lifetime policy
    #[serde(default)]
    pub compliance: ComplianceConfig,
}

impl SessionManagerConfig {
    /// Create a configuration with default cookie attributes and no
    /// lifetime bounds.
    pub fn new(signing_key: impl Into<Vec<u8>>, security_token_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
            security_token_key: security_token_key.into(),
            cookie: CookieConfig::default(),
            compliance: ComplianceConfig::default(),
        }
    }

    /// Load from `WICKET_SESSION_*` environment variables.
    ///
    /// Both keys are required; every other variable is optional.
    pub fn from_env() -> SessionResult<Self> {
        let signing_key = required_env("WICKET_SESSION_SIGNING_KEY")?;
        let token_key = required_env("WICKET_SESSION_TOKEN_KEY")?;
        let mut config = Self::new(signing_key, token_key);

        if let Ok(name) = std::env::var("WICKET_SESSION_COOKIE_NAME") {
            config.cookie.name = name;
        }
        if let Ok(path) = std::env::var("WICKET_SESSION_COOKIE_PATH") {
            config.cookie.path = path;
        }
        if let Ok(domain) = std::env::var("WICKET_SESSION_COOKIE_DOMAIN") {
            config.cookie.domain = Some(domain);
        }
        if let Some(secure) = bool_env("WICKET_SESSION_COOKIE_SECURE") {
            config.cookie.secure = secure;
        }
        if let Ok(mode) = std::env::var("WICKET_SESSION_SAME_SITE") {
            config.cookie.same_site = mode.parse()?;
        }
        if let Some(session_only) = bool_env("WICKET_SESSION_SESSION_ONLY") {
            config.cookie.session_only = session_only;
        }
        if let Some(secs) = secs_env("WICKET_SESSION_MAX_DURATION_SECS")? {
            config.compliance.max_session_duration = secs;
        }
        if let Some(secs) = secs_env("WICKET_SESSION_INACTIVITY_SECS")? {
            config.compliance.inactivity_timeout = secs;
        }
        if let Some(enabled) = bool_env("WICKET_SESSION_PASSWORD_CHANGE_REFRESH") {
            config.compliance.password_change_refresh = enabled;
        }

        Ok(config)
    }

    /// Set cookie attributes.
    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    /// Set the lifetime policy.
    pub fn with_compliance(mut self, compliance: ComplianceConfig) -> Self {
        self.compliance = compliance;
        self
    }

    /// Check keys and cookie attributes.
    pub fn validate(&self) -> SessionResult<()> {
        if self.signing_key.is_empty() {
            return Err(SessionError::Config("signing key must not be empty".to_string()));
        }
        if self.security_token_key.is_empty() {
            return Err(SessionError::Config(
                "security token key must not be empty".to_string(),
            ));
        }
        self.cookie.validate()
    }
}

impl std::fmt::Debug for SessionManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManagerConfig")
            .field("signing_key", &"[redacted]")
            .field("security_token_key", &"[redacted]")
            .field("cookie", &self.cookie)
            .field("compliance", &self.compliance)
            .finish()
    }
}

fn required_env(name: &str) -> SessionResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(SessionError::Config(format!("{} must be set", name))),
    }
}

fn bool_env(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn secs_env(name: &str) -> SessionResult<Option<Duration>> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| SessionError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

/// Durations as integer milliseconds.
mod duration_ms {
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
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
