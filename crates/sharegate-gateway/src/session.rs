//! Cookie sessions.
//!
//! A session is the cookie pair `auth=1` plus `is_master=true|false`. There
//! is no server-side session table; the cookies are the whole session, so
//! logout is just clearing them. Both cookies are `HttpOnly`, `Path=/`,
//! `SameSite=Lax`, with a shared configurable lifetime.

use axum::http::header::{COOKIE, HeaderMap, HeaderName, SET_COOKIE};

/// The parsed session cookie pair.
///
/// `is_master` is only honored alongside `auth`; a stray `is_master=true`
/// without `auth=1` carries no privilege.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCookies {
    pub auth: bool,
    pub is_master: bool,
}

/// Parse the `Cookie` header. Absent or malformed headers yield the
/// anonymous session.
#[must_use]
pub fn parse(headers: &HeaderMap) -> SessionCookies {
    let mut auth = false;
    let mut is_master = false;

    if let Some(value) = headers.get(COOKIE) {
        if let Ok(raw) = value.to_str() {
            for pair in raw.split(';') {
                let pair = pair.trim();
                if let Some(v) = pair.strip_prefix("auth=") {
                    auth = v == "1";
                } else if let Some(v) = pair.strip_prefix("is_master=") {
                    is_master = v == "true";
                }
            }
        }
    }

    SessionCookies {
        auth,
        is_master: auth && is_master,
    }
}

/// `Set-Cookie` headers establishing a session.
#[must_use]
pub fn login_cookies(ttl_secs: u64, is_master: bool) -> [(HeaderName, String); 2] {
    [
        (
            SET_COOKIE,
            format!("auth=1; Max-Age={ttl_secs}; Path=/; HttpOnly; SameSite=Lax"),
        ),
        (
            SET_COOKIE,
            format!("is_master={is_master}; Max-Age={ttl_secs}; Path=/; HttpOnly; SameSite=Lax"),
        ),
    ]
}

/// `Set-Cookie` headers tearing a session down (`Max-Age=0`).
#[must_use]
pub fn clear_cookies() -> [(HeaderName, String); 2] {
    [
        (
            SET_COOKIE,
            "auth=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax".to_owned(),
        ),
        (
            SET_COOKIE,
            "is_master=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax".to_owned(),
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(raw).unwrap());
        headers
    }

    #[test]
    fn no_cookie_header_is_anonymous() {
        let session = parse(&HeaderMap::new());
        assert_eq!(session, SessionCookies::default());
    }

    #[test]
    fn parses_master_session() {
        let session = parse(&headers_with_cookie("auth=1; is_master=true"));
        assert!(session.auth);
        assert!(session.is_master);
    }

    #[test]
    fn parses_regular_session() {
        let session = parse(&headers_with_cookie("is_master=false; auth=1"));
        assert!(session.auth);
        assert!(!session.is_master);
    }

    #[test]
    fn is_master_without_auth_carries_no_privilege() {
        let session = parse(&headers_with_cookie("is_master=true"));
        assert!(!session.auth);
        assert!(!session.is_master);
    }

    #[test]
    fn unrelated_cookies_are_ignored() {
        let session = parse(&headers_with_cookie("theme=dark; auth=1; lang=en"));
        assert!(session.auth);
    }

    #[test]
    fn wrong_values_do_not_authenticate() {
        let session = parse(&headers_with_cookie("auth=true; is_master=1"));
        assert!(!session.auth);
        assert!(!session.is_master);
    }

    #[test]
    fn login_cookie_attributes() {
        let [(_, auth), (_, master)] = login_cookies(28_800, true);
        assert!(auth.starts_with("auth=1; Max-Age=28800"));
        assert!(auth.contains("HttpOnly"));
        assert!(auth.contains("SameSite=Lax"));
        assert!(master.starts_with("is_master=true"));
    }

    #[test]
    fn clear_cookies_expire_immediately() {
        for (_, cookie) in clear_cookies() {
            assert!(cookie.contains("Max-Age=0"));
        }
    }
}
