//! Cookie parsing, path scoping and `Set-Cookie` rendering.

use crate::config::CookieConfig;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use http::header::COOKIE;

/// RFC 6265 path-match.
///
/// Matches when the paths are equal, or when `cookie_path` is a prefix of
/// `request_path` and either ends with `/` or is followed by `/` in the
/// request path. Empty paths count as `/`.
///
/// ```
/// use wicket_session::cookie::path_matches;
///
/// assert!(path_matches("/app/settings", "/app"));
/// assert!(!path_matches("/application", "/app"));
/// ```
pub fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    let request_path = if request_path.is_empty() { "/" } else { request_path };
    let cookie_path = if cookie_path.is_empty() { "/" } else { cookie_path };

    if request_path == cookie_path {
        return true;
    }
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Find the value of the first cookie called `name` across every `Cookie`
/// header.
pub fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim();
            value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value)
        })
}

/// Render a `Set-Cookie` header value.
///
/// `expires` is omitted for browser-session cookies.
pub fn set_cookie_header(config: &CookieConfig, value: &str, expires: Option<DateTime<Utc>>) -> String {
    let path = if config.path.is_empty() { "/" } else { &config.path };
    let mut cookie = format!("{}={}; Path={}", config.name, value, path);

    if let Some(ref domain) = config.domain {
        cookie.push_str(&format!("; Domain={}", domain));
    }

    if let Some(expires) = expires.filter(|_| !config.session_only) {
        let expires = std::time::SystemTime::from(expires);
        cookie.push_str(&format!("; Expires={}", httpdate::fmt_http_date(expires)));
    }

    cookie.push_str("; HttpOnly");

    if config.secure {
        cookie.push_str("; Secure");
    }

    cookie.push_str(&format!("; SameSite={}", config.same_site.as_str()));
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SameSite;
    use http::HeaderValue;

    #[test]
    fn test_path_match_table() {
        let cases = [
            ("/subpath", "/subpath", true),
            ("/subpath/", "/subpath", true),
            ("/subpath/x", "/subpath", true),
            ("/other", "/subpath", false),
            ("/subpathx", "/subpath", false),
            ("/", "/", true),
            ("/anything", "/", true),
            ("/app/x", "/app/", true),
            ("/app", "/app/", false),
            ("", "", true),
            ("/x", "", true),
        ];
        for (request, cookie, expected) in cases {
            assert_eq!(
                path_matches(request, cookie),
                expected,
                "request {:?} cookie {:?}",
                request,
                cookie
            );
        }
    }

    #[test]
    fn test_find_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; lang=en"));
        headers.append(COOKIE, HeaderValue::from_static("sid=abc.def=; other=1"));

        assert_eq!(find_cookie(&headers, "lang"), Some("en"));
        // value keeps everything after the first '='
        assert_eq!(find_cookie(&headers, "sid"), Some("abc.def="));
        assert_eq!(find_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_find_cookie_strips_quotes_and_takes_first() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("sid=\"v1\"; sid=v2"));
        assert_eq!(find_cookie(&headers, "sid"), Some("v1"));
    }

    #[test]
    fn test_set_cookie_header() {
        let config = CookieConfig::default()
            .with_domain("example.com")
            .with_same_site(SameSite::Strict);
        let expires = DateTime::from_timestamp(1_445_412_480, 0).unwrap();

        let header = set_cookie_header(&config, "id.sig", Some(expires));
        assert_eq!(
            header,
            "hyy_session_id=id.sig; Path=/; Domain=example.com; \
             Expires=Wed, 21 Oct 2015 07:28:00 GMT; HttpOnly; Secure; SameSite=Strict"
        );
    }

    #[test]
    fn test_session_only_cookie_has_no_expiry() {
        let config = CookieConfig::default()
            .with_session_only(true)
            .with_secure(false);
        let header = set_cookie_header(&config, "v", Some(Utc::now()));
        assert!(!header.contains("Expires"));
        assert!(!header.contains("Secure"));
        assert!(header.contains("HttpOnly"));
        assert!(header.ends_with("SameSite=Lax"));
    }
}
