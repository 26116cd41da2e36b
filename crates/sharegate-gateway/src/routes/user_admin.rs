//! Master-only user administration.
//!
//! Nested under `/user-admin` with [`require_master`] as a route layer, so
//! no handler here runs without a master session. All mutations are
//! read-modify-write of the whole user map followed by redirect-after-write
//! with a banner code.

use std::sync::Arc;

use axum::Form;
use axum::Router;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{info, warn};

use sharegate_vault::store::{UserRecord, validate_username};

use crate::error::AppError;
use crate::pages;
use crate::routes::found;
use crate::session;
use crate::state::GatewayState;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/", get(panel))
        .route("/add", post(add_user))
        .route("/delete", post(delete_user))
        .route(
            "/change-password-page",
            get(change_password_page).post(change_password_page_post),
        )
        .route("/perform-change-password", post(perform_change_password))
}

/// Route layer rejecting anything but a master session with the 403 page.
pub async fn require_master(req: Request, next: Next) -> Response {
    let cookies = session::parse(req.headers());
    if cookies.auth && cookies.is_master {
        return next.run(req).await;
    }

    let requested = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_owned(), |pq| pq.as_str().to_owned());
    warn!(path = %req.uri().path(), "non-master session denied from user administration");
    (
        StatusCode::FORBIDDEN,
        Html(pages::render_access_denied(&requested)),
    )
        .into_response()
}

#[derive(Deserialize)]
struct PanelQuery {
    error: Option<String>,
    success: Option<String>,
}

#[derive(Deserialize)]
struct AddUserForm {
    #[serde(rename = "newUsername", default)]
    new_username: String,
    #[serde(rename = "newPassword", default)]
    new_password: String,
    #[serde(rename = "confirmPassword", default)]
    confirm_password: String,
}

#[derive(Deserialize)]
struct DeleteUserForm {
    #[serde(rename = "usernameToDelete", default)]
    username_to_delete: String,
}

#[derive(Deserialize)]
struct ChangePasswordTarget {
    #[serde(rename = "usernameToChange", default)]
    username_to_change: String,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChangePasswordForm {
    #[serde(default)]
    username: String,
    #[serde(rename = "newPassword", default)]
    new_password: String,
    #[serde(rename = "confirmPassword", default)]
    confirm_password: String,
}

/// Redirect to the change-password form with an error banner, keeping the
/// target username in the query.
fn change_password_error(username: &str, code: &str) -> Response {
    found(&format!(
        "/user-admin/change-password-page?usernameToChange={}&error={code}",
        urlencoding::encode(username)
    ))
}

// ── Handlers ──

async fn panel(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<PanelQuery>,
) -> Html<String> {
    let (usernames, error_code) = match state.store.load_users(&state.vault).await {
        Ok(users) => (users.keys().cloned().collect(), query.error),
        Err(e) => {
            warn!(error = %e, "cannot list users");
            (Vec::new(), Some("load_failed".to_owned()))
        }
    };
    Html(pages::render_user_admin(
        &usernames,
        error_code.as_deref(),
        query.success.as_deref(),
    ))
}

async fn add_user(
    State(state): State<Arc<GatewayState>>,
    Form(form): Form<AddUserForm>,
) -> Result<Response, AppError> {
    let username = form.new_username.trim();
    if username.is_empty() || form.new_password.is_empty() || form.confirm_password.is_empty() {
        return Ok(found("/user-admin?error=missing_fields"));
    }
    if form.new_password.trim().is_empty() {
        return Ok(found("/user-admin?error=password_empty"));
    }
    if form.new_password != form.confirm_password {
        return Ok(found("/user-admin?error=password_mismatch"));
    }
    if !validate_username(username) {
        return Ok(found("/user-admin?error=invalid_username"));
    }

    let mut users = match state.store.load_users(&state.vault).await {
        Ok(users) => users,
        Err(e) => {
            warn!(error = %e, "cannot load users to add one");
            return Ok(found("/user-admin?error=load_failed"));
        }
    };
    if users.contains_key(username) {
        return Ok(found("/user-admin?error=user_exists"));
    }

    let password_blob = state
        .vault
        .encrypt(&form.new_password)
        .map_err(|e| AppError(e.to_string()))?;
    users.insert(username.to_owned(), UserRecord { password_blob });
    state.store.save_users(&state.vault, &users).await?;

    info!(username, "user created");
    Ok(found("/user-admin?success=user_added"))
}

async fn delete_user(
    State(state): State<Arc<GatewayState>>,
    Form(form): Form<DeleteUserForm>,
) -> Result<Response, AppError> {
    let username = form.username_to_delete.trim();
    if username.is_empty() {
        return Ok(found("/user-admin?error=missing_fields"));
    }

    let mut users = match state.store.load_users(&state.vault).await {
        Ok(users) => users,
        Err(e) => {
            warn!(error = %e, "cannot load users to delete one");
            return Ok(found("/user-admin?error=load_failed"));
        }
    };
    if users.remove(username).is_none() {
        return Ok(found("/user-admin?error=user_not_found"));
    }
    state.store.save_users(&state.vault, &users).await?;

    info!(username, "user deleted");
    Ok(found("/user-admin?success=user_deleted"))
}

async fn change_password_page(
    State(state): State<Arc<GatewayState>>,
    Query(target): Query<ChangePasswordTarget>,
) -> Result<Response, AppError> {
    render_change_password_page(&state, &target).await
}

/// The panel reaches this form with a POST (the username travels in the
/// form body); error redirects come back as GET with query parameters.
async fn change_password_page_post(
    State(state): State<Arc<GatewayState>>,
    Form(target): Form<ChangePasswordTarget>,
) -> Result<Response, AppError> {
    render_change_password_page(&state, &target).await
}

async fn render_change_password_page(
    state: &GatewayState,
    target: &ChangePasswordTarget,
) -> Result<Response, AppError> {
    let username = target.username_to_change.trim();
    if username.is_empty() {
        return Ok(found("/user-admin?error=missing_fields"));
    }

    let users = match state.store.load_users(&state.vault).await {
        Ok(users) => users,
        Err(e) => {
            warn!(error = %e, "cannot load users for password change");
            return Ok(found("/user-admin?error=load_failed"));
        }
    };
    if !users.contains_key(username) {
        return Ok(found("/user-admin?error=user_not_found"));
    }

    Ok(Html(pages::render_change_password(username, target.error.as_deref())).into_response())
}

async fn perform_change_password(
    State(state): State<Arc<GatewayState>>,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Response, AppError> {
    let username = form.username.trim();
    if username.is_empty() {
        return Ok(found("/user-admin?error=missing_fields"));
    }
    if form.new_password.is_empty() || form.confirm_password.is_empty() {
        return Ok(change_password_error(username, "missing_fields"));
    }
    if form.new_password.trim().is_empty() {
        return Ok(change_password_error(username, "password_empty"));
    }
    if form.new_password != form.confirm_password {
        return Ok(change_password_error(username, "password_mismatch"));
    }

    let mut users = match state.store.load_users(&state.vault).await {
        Ok(users) => users,
        Err(e) => {
            warn!(error = %e, "cannot load users to change a password");
            return Ok(found("/user-admin?error=load_failed"));
        }
    };
    let Some(record) = users.get_mut(username) else {
        return Ok(found("/user-admin?error=user_not_found"));
    };

    record.password_blob = state
        .vault
        .encrypt(&form.new_password)
        .map_err(|e| AppError(e.to_string()))?;
    state.store.save_users(&state.vault, &users).await?;

    info!(username, "user password changed");
    Ok(found("/user-admin?success=password_changed"))
}
