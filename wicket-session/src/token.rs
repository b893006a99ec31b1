//! Security (CSRF) tokens.
//!
//! Decoded layout, 40 bytes:
//!
//! ```text
//! | 32 random bytes | 4-byte BE unix seconds | 4-byte truncated HMAC-SHA256 |
//! ```
//!
//! The tag covers the random bytes only. Tokens are encoded as padded
//! base64url.

use crate::error::{SessionError, SessionResult};
use crate::signing::keyed_mac;
use base64::{Engine, engine::general_purpose::URL_SAFE};
use chrono::{DateTime, Utc};
use hmac::Mac;
use rand::RngCore;
use rand::rngs::OsRng;

const RANDOM_LEN: usize = 32;
const TIMESTAMP_LEN: usize = 4;
const TAG_LEN: usize = 4;
const TOKEN_LEN: usize = RANDOM_LEN + TIMESTAMP_LEN + TAG_LEN;

/// Maximum distance, in seconds, between a token's timestamp and now.
pub const MAX_CLOCK_DRIFT_SECS: i64 = 30;

/// Tokens younger than this many seconds are returned unchanged by
/// [`refresh_security_token`].
pub const REFRESH_COOLDOWN_SECS: i64 = 5 * 60;

fn tag(random: &[u8], key: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = keyed_mac(key);
    mac.update(random);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&full[..TAG_LEN]);
    out
}

/// Mint a new security token.
///
/// # Panics
///
/// Panics if the operating system entropy source fails.
pub fn generate_security_token(key: &[u8]) -> String {
    generate_security_token_at(key, Utc::now())
}

/// Mint a token stamped with `now`.
///
/// # Panics
///
/// Panics if the operating system entropy source fails.
pub fn generate_security_token_at(key: &[u8], now: DateTime<Utc>) -> String {
    let mut buf = [0u8; TOKEN_LEN];
    if let Err(e) = OsRng.try_fill_bytes(&mut buf[..RANDOM_LEN]) {
        panic!("OS entropy source failed: {}", e);
    }

    let ts = now.timestamp().clamp(0, u32::MAX as i64) as u32;
    buf[RANDOM_LEN..RANDOM_LEN + TIMESTAMP_LEN].copy_from_slice(&ts.to_be_bytes());

    let tag = tag(&buf[..RANDOM_LEN], key);
    buf[RANDOM_LEN + TIMESTAMP_LEN..].copy_from_slice(&tag);

    URL_SAFE.encode(buf)
}

/// Decode a token and check its tag, returning the embedded issue time.
///
/// Freshness is not checked.
pub fn authenticate_security_token(token: &str, key: &[u8]) -> Option<DateTime<Utc>> {
    let data = URL_SAFE.decode(token).ok()?;
    if data.len() < TOKEN_LEN {
        return None;
    }

    let mut mac = keyed_mac(key);
    mac.update(&data[..RANDOM_LEN]);
    mac.verify_truncated_left(&data[RANDOM_LEN + TIMESTAMP_LEN..TOKEN_LEN])
        .ok()?;

    let mut ts = [0u8; TIMESTAMP_LEN];
    ts.copy_from_slice(&data[RANDOM_LEN..RANDOM_LEN + TIMESTAMP_LEN]);
    DateTime::from_timestamp(u32::from_be_bytes(ts) as i64, 0)
}

/// Validate a token: authentic, and stamped within
/// [`MAX_CLOCK_DRIFT_SECS`] of now.
pub fn validate_security_token(token: &str, key: &[u8]) -> bool {
    validate_security_token_at(token, key, Utc::now())
}

/// Validate a token against an explicit clock.
pub fn validate_security_token_at(token: &str, key: &[u8], now: DateTime<Utc>) -> bool {
    authenticate_security_token(token, key)
        .is_some_and(|issued| (now.timestamp() - issued.timestamp()).abs() <= MAX_CLOCK_DRIFT_SECS)
}

/// Replace a token once it is past the refresh cooldown.
///
/// Returns [`SessionError::InvalidToken`] if `old` does not validate.
pub fn refresh_security_token(old: &str, key: &[u8]) -> SessionResult<String> {
    refresh_security_token_at(old, key, Utc::now())
}

/// [`refresh_security_token`] against an explicit clock.
pub fn refresh_security_token_at(old: &str, key: &[u8], now: DateTime<Utc>) -> SessionResult<String> {
    if !validate_security_token_at(old, key, now) {
        return Err(SessionError::InvalidToken);
    }
    let issued = authenticate_security_token(old, key).ok_or(SessionError::InvalidToken)?;

    if now.timestamp() - issued.timestamp() < REFRESH_COOLDOWN_SECS {
        return Ok(old.to_string());
    }
    Ok(generate_security_token_at(key, now))
}
