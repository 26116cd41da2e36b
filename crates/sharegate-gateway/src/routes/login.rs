//! Login, logout, and the login page.
//!
//! A blank (or whitespace) username means the master passphrase; anything
//! else is a regular user. Wrong username and wrong password collapse into
//! the same `invalid` code so the form never confirms which usernames
//! exist. Credential-file problems get their own codes: the operator must
//! see "cannot decrypt" and not mistake it for a typo.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Form;
use axum::Router;
use axum::extract::{Query, State};
use axum::response::{AppendHeaders, Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{info, warn};

use sharegate_vault::store::{MasterVerdict, UserVerdict};

use crate::error::AppError;
use crate::pages;
use crate::routes::found;
use crate::session;
use crate::state::GatewayState;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/login", get(login_page))
        .route("/do_login", post(do_login))
        .route("/logout", get(logout))
}

#[derive(Deserialize)]
struct LoginPageQuery {
    error: Option<String>,
    info: Option<String>,
    #[serde(rename = "returnTo")]
    return_to: Option<String>,
}

#[derive(Deserialize)]
struct ReturnToQuery {
    #[serde(rename = "returnTo")]
    return_to: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Build a redirect back to the login form, keeping `returnTo` alive so a
/// successful retry still lands where the client was headed.
fn login_error(code: &str, return_to: Option<&str>) -> Response {
    let mut location = format!("/login?error={code}");
    if let Some(return_to) = return_to {
        location.push_str("&returnTo=");
        location.push_str(&urlencoding::encode(return_to));
    }
    found(&location)
}

/// Only same-site paths are honored as post-login targets.
fn sanitize_return_to(return_to: Option<&str>) -> Option<&str> {
    return_to.filter(|r| r.starts_with('/') && !r.starts_with("//"))
}

// ── Handlers ──

async fn login_page(Query(query): Query<LoginPageQuery>) -> Html<String> {
    Html(pages::render_login(
        query.error.as_deref(),
        query.info.as_deref(),
        sanitize_return_to(query.return_to.as_deref()),
    ))
}

async fn do_login(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ReturnToQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let return_to = sanitize_return_to(query.return_to.as_deref());

    if state.setup_needed.load(Ordering::SeqCst) {
        return Ok(login_error("master_not_set", return_to));
    }
    if form.password.is_empty() {
        return Ok(login_error("invalid", return_to));
    }

    let username = form.username.trim();
    if username.is_empty() {
        return master_login(&state, &form.password, return_to).await;
    }
    user_login(&state, username, &form.password, return_to).await
}

async fn master_login(
    state: &GatewayState,
    password: &str,
    return_to: Option<&str>,
) -> Result<Response, AppError> {
    match state.store.verify_master(&state.vault, password).await? {
        MasterVerdict::Match => {
            info!("master signed in");
            let target = match return_to {
                Some(r) if r.starts_with("/user-admin") => r,
                _ => "/user-admin",
            };
            Ok((
                AppendHeaders(session::login_cookies(state.config.session_ttl_secs, true)),
                found(target),
            )
                .into_response())
        }
        MasterVerdict::Mismatch => {
            warn!("master sign-in failed: wrong passphrase");
            Ok(login_error("invalid", return_to))
        }
        MasterVerdict::NotConfigured => {
            // The master file disappeared after startup; drop back into
            // setup mode.
            warn!("master credential file is missing, re-entering setup");
            state.setup_needed.store(true, Ordering::SeqCst);
            Ok(found("/setup"))
        }
        MasterVerdict::DecryptFailed => {
            warn!("master sign-in failed: credential file cannot be decrypted");
            Ok(login_error("decrypt_failed", return_to))
        }
    }
}

async fn user_login(
    state: &GatewayState,
    username: &str,
    password: &str,
    return_to: Option<&str>,
) -> Result<Response, AppError> {
    use sharegate_vault::error::StoreError;

    if !state.store.users_file_exists().await {
        return Ok(login_error("no_user_file", return_to));
    }

    let verdict = match state.store.verify_user(&state.vault, username, password).await {
        Ok(verdict) => verdict,
        Err(StoreError::DecryptFailed { .. } | StoreError::Corrupt { .. }) => {
            warn!("user sign-in failed: credential file cannot be read");
            return Ok(login_error("decrypt_failed", return_to));
        }
        Err(StoreError::Io { .. }) => {
            return Ok(login_error("read_failed", return_to));
        }
        Err(e) => return Err(e.into()),
    };

    match verdict {
        UserVerdict::Match => {
            info!(username, "user signed in");
            // Regular users never land in the master-only area.
            let target = match return_to {
                Some(r) if !r.starts_with("/user-admin") => r,
                _ => "/admin",
            };
            Ok((
                AppendHeaders(session::login_cookies(state.config.session_ttl_secs, false)),
                found(target),
            )
                .into_response())
        }
        UserVerdict::Mismatch | UserVerdict::UnknownUser => {
            warn!(username, "user sign-in failed");
            Ok(login_error("invalid", return_to))
        }
        UserVerdict::DecryptFailed => {
            warn!(username, "user sign-in failed: password blob cannot be decrypted");
            Ok(login_error("decrypt_failed", return_to))
        }
    }
}

async fn logout() -> Response {
    (
        AppendHeaders(session::clear_cookies()),
        found("/login?info=logged_out"),
    )
        .into_response()
}
