//! HMAC-SHA256 cookie signing.

use base64::{Engine, engine::general_purpose::URL_SAFE};
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

pub(crate) fn keyed_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size")
}

/// Signs and verifies session ids carried in cookies.
///
/// A signed value has the form `<id>.<base64url(HMAC-SHA256(key, id))>`.
///
/// # Examples
///
/// ```
/// use wicket_session::CookieSigner;
///
/// let signer = CookieSigner::new("cookie-signing-key");
/// let signed = signer.sign("3f0c9a2e");
/// assert_eq!(signer.verify(&signed).as_deref(), Some("3f0c9a2e"));
/// assert_eq!(signer.verify("3f0c9a2e.AAAA"), None);
/// ```
#[derive(Clone)]
pub struct CookieSigner {
    key: Vec<u8>,
}

impl CookieSigner {
    /// Create a signer from raw key bytes.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Sign a session id.
    pub fn sign(&self, id: &str) -> String {
        let mut mac = keyed_mac(&self.key);
        mac.update(id.as_bytes());
        let tag = mac.finalize().into_bytes();
        format!("{}.{}", id, URL_SAFE.encode(tag))
    }

    /// Verify a signed value and return the session id it carries.
    ///
    /// Returns `None` for anything malformed or carrying the wrong tag. The
    /// tag comparison is constant-time.
    pub fn verify(&self, signed: &str) -> Option<String> {
        let (id, encoded_tag) = signed.split_once('.')?;
        if id.is_empty() {
            return None;
        }
        let tag = URL_SAFE.decode(encoded_tag).ok()?;

        let mut mac = keyed_mac(&self.key);
        mac.update(id.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(id.to_string())
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner")
            .field("key", &"[redacted]")
            .finish()
    }
}
