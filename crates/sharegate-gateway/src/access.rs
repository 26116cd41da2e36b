//! Access-control middleware.
//!
//! Every request passes through [`decide`], a pure total function over the
//! request path, the parsed session cookies, and the setup flag. The rules,
//! in order:
//!
//! 1. Static assets (`/css/`, `/js/`, `/uploads/`) are always allowed.
//! 2. While setup is pending, only `/setup` and `/do_setup` are reachable;
//!    everything else redirects to `/setup`.
//! 3. `/user-admin` passes through here; the master-only guard lives on
//!    that subrouter.
//! 4. `/admin` requires an authenticated session, else a redirect to
//!    `/login` carrying the original URI as `returnTo`.
//! 5. Auth pages are open, except that an already-authenticated session
//!    visiting `/login` or `/setup` is bounced to its landing page.
//! 6. Everything else falls through to the reverse proxy.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::routes::found;
use crate::session::{self, SessionCookies};
use crate::state::GatewayState;

/// Path prefixes served without any session check.
const STATIC_PREFIXES: &[&str] = &["/css/", "/js/", "/uploads/"];

/// The gateway's own auth pages.
const AUTH_PATHS: &[&str] = &["/login", "/do_login", "/setup", "/do_setup", "/logout"];

/// Outcome of the access-control decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Let the request through to its route or the proxy.
    Allow,
    /// Setup is pending; send the client to `/setup`.
    RedirectSetup,
    /// The protected area needs a session; send to `/login` with the
    /// original URI so login can return the client where it was headed.
    RedirectLogin { return_to: String },
    /// An authenticated client revisited `/login` or `/setup`; send it to
    /// its landing page instead.
    RedirectLanding { master: bool },
}

/// Decide what to do with a request. Total: every combination of inputs
/// maps to exactly one decision.
#[must_use]
pub fn decide(
    path: &str,
    original_uri: &str,
    cookies: &SessionCookies,
    setup_needed: bool,
) -> AccessDecision {
    if STATIC_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return AccessDecision::Allow;
    }

    if setup_needed {
        if path == "/setup" || path == "/do_setup" {
            return AccessDecision::Allow;
        }
        return AccessDecision::RedirectSetup;
    }

    // The subrouter guard enforces master; unauthenticated visitors get its
    // access-denied page rather than a login redirect.
    if path.starts_with("/user-admin") {
        return AccessDecision::Allow;
    }

    if path.starts_with("/admin") {
        if cookies.auth {
            return AccessDecision::Allow;
        }
        return AccessDecision::RedirectLogin {
            return_to: original_uri.to_owned(),
        };
    }

    if AUTH_PATHS.contains(&path) {
        if cookies.auth && (path == "/login" || path == "/setup") {
            return AccessDecision::RedirectLanding {
                master: cookies.is_master,
            };
        }
        return AccessDecision::Allow;
    }

    AccessDecision::Allow
}

/// Axum middleware applying [`decide`] to every request.
pub async fn access_middleware(
    State(state): State<Arc<GatewayState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let original_uri = req
        .uri()
        .path_and_query()
        .map_or_else(|| path.clone(), |pq| pq.as_str().to_owned());
    let cookies = session::parse(req.headers());
    let setup_needed = state.setup_needed.load(Ordering::SeqCst);

    match decide(&path, &original_uri, &cookies, setup_needed) {
        AccessDecision::Allow => next.run(req).await,
        AccessDecision::RedirectSetup => found("/setup"),
        AccessDecision::RedirectLogin { return_to } => {
            found(&format!("/login?returnTo={}", urlencoding::encode(&return_to)))
        }
        AccessDecision::RedirectLanding { master } => {
            found(if master { "/user-admin" } else { "/admin" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANON: SessionCookies = SessionCookies {
        auth: false,
        is_master: false,
    };
    const USER: SessionCookies = SessionCookies {
        auth: true,
        is_master: false,
    };
    const MASTER: SessionCookies = SessionCookies {
        auth: true,
        is_master: true,
    };

    #[test]
    fn static_assets_always_allowed() {
        for path in ["/css/site.css", "/js/app.js", "/uploads/photo.jpg"] {
            assert_eq!(decide(path, path, &ANON, true), AccessDecision::Allow);
            assert_eq!(decide(path, path, &ANON, false), AccessDecision::Allow);
        }
    }

    #[test]
    fn setup_pending_forces_setup() {
        assert_eq!(decide("/setup", "/setup", &ANON, true), AccessDecision::Allow);
        assert_eq!(
            decide("/do_setup", "/do_setup", &ANON, true),
            AccessDecision::Allow
        );
        for path in ["/", "/admin", "/login", "/user-admin", "/anything"] {
            assert_eq!(decide(path, path, &ANON, true), AccessDecision::RedirectSetup);
        }
    }

    #[test]
    fn admin_requires_session() {
        assert_eq!(
            decide("/admin/files", "/admin/files?page=2", &ANON, false),
            AccessDecision::RedirectLogin {
                return_to: "/admin/files?page=2".to_owned()
            }
        );
        assert_eq!(decide("/admin", "/admin", &USER, false), AccessDecision::Allow);
        assert_eq!(decide("/admin", "/admin", &MASTER, false), AccessDecision::Allow);
    }

    #[test]
    fn user_admin_passes_to_subrouter_guard() {
        assert_eq!(
            decide("/user-admin", "/user-admin", &ANON, false),
            AccessDecision::Allow
        );
        assert_eq!(
            decide("/user-admin/add", "/user-admin/add", &USER, false),
            AccessDecision::Allow
        );
    }

    #[test]
    fn authenticated_session_bounced_off_login_and_setup() {
        assert_eq!(
            decide("/login", "/login", &USER, false),
            AccessDecision::RedirectLanding { master: false }
        );
        assert_eq!(
            decide("/setup", "/setup", &MASTER, false),
            AccessDecision::RedirectLanding { master: true }
        );
        // Logout stays reachable for authenticated sessions.
        assert_eq!(decide("/logout", "/logout", &USER, false), AccessDecision::Allow);
    }

    #[test]
    fn auth_pages_open_to_anonymous() {
        for path in ["/login", "/do_login", "/logout"] {
            assert_eq!(decide(path, path, &ANON, false), AccessDecision::Allow);
        }
    }

    #[test]
    fn everything_else_proxies() {
        for path in ["/", "/gallery", "/api/files", "/favicon.ico"] {
            assert_eq!(decide(path, path, &ANON, false), AccessDecision::Allow);
        }
    }
}
