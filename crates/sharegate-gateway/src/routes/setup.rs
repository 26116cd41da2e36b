//! First-run setup routes.
//!
//! While no master passphrase exists, the access middleware funnels every
//! request here. `POST /do_setup` saves the passphrase, creates the empty
//! user file, flips `setup_needed`, and starts the application — the one
//! moment the gateway transitions from setup mode to normal operation.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Form;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::{error, info, warn};

use sharegate_vault::error::StoreError;
use sharegate_vault::store::MIN_PASSPHRASE_LEN;

use crate::pages;
use crate::routes::found;
use crate::state::GatewayState;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/setup", get(setup_page))
        .route("/do_setup", post(do_setup))
}

#[derive(Deserialize)]
struct SetupPageQuery {
    error: Option<String>,
}

#[derive(Deserialize)]
struct SetupForm {
    #[serde(rename = "newPassword")]
    new_password: String,
    #[serde(rename = "confirmPassword")]
    confirm_password: String,
}

// ── Handlers ──

async fn setup_page(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<SetupPageQuery>,
) -> Response {
    if !state.setup_needed.load(Ordering::SeqCst) {
        return found("/login");
    }
    Html(pages::render_setup(query.error.as_deref())).into_response()
}

async fn do_setup(
    State(state): State<Arc<GatewayState>>,
    Form(form): Form<SetupForm>,
) -> Response {
    // Once a master passphrase exists, this endpoint is dead: resubmitting
    // the setup form must never overwrite it.
    if !state.setup_needed.load(Ordering::SeqCst) {
        warn!("setup form submitted after setup already completed");
        return (
            StatusCode::FORBIDDEN,
            Html(pages::render_setup_forbidden()),
        )
            .into_response();
    }

    if form.new_password.chars().count() < MIN_PASSPHRASE_LEN {
        return found("/setup?error=short");
    }
    if form.new_password != form.confirm_password {
        return found("/setup?error=mismatch");
    }

    if let Err(e) = state.store.save_master(&state.vault, &form.new_password).await {
        error!(error = %e, "failed to save the master passphrase");
        return match e {
            StoreError::PassphraseTooShort { .. } => found("/setup?error=short"),
            StoreError::Crypto(_) => found("/setup?error=encrypt_failed"),
            _ => found("/setup?error=write_failed"),
        };
    }

    if let Err(e) = state.store.ensure_users_file(&state.vault).await {
        // The master is saved; a missing user file only degrades user
        // logins, so continue and let the error banner surface it later.
        error!(error = %e, "failed to create the user credential file");
    }

    state.setup_needed.store(false, Ordering::SeqCst);
    info!("first-run setup complete, starting the application");
    state.supervisor.start().await;

    Html(pages::render_setup_done()).into_response()
}
