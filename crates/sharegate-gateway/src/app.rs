//! State construction and router assembly.
//!
//! Split out of `main` so the integration tests can build the exact router
//! the binary serves, backed by a temporary data directory.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use axum::Router;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware as axum_mw;
use axum::response::Response;
use http_body_util::Full;
use hyper::body::Bytes;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use sharegate_vault::crypto::{self, Vault};
use sharegate_vault::keyfile;
use sharegate_vault::store::CredentialStore;

use crate::access;
use crate::config::GatewayConfig;
use crate::pages;
use crate::proxy::{self, ProxyClient};
use crate::routes;
use crate::state::GatewayState;
use crate::supervisor::{AppProcessConfig, Supervisor};

/// Build the shared state: key material, vault, store, supervisor, proxy.
///
/// # Errors
///
/// Fails if the key material cannot be loaded or created, or if key
/// derivation fails. A missing master passphrase is not an error; it puts
/// the gateway into setup mode.
pub async fn build_state(config: &GatewayConfig) -> anyhow::Result<Arc<GatewayState>> {
    let key_path = config.data_dir.join(keyfile::KEY_MATERIAL_FILE);
    let material = keyfile::load_or_create(&key_path)
        .await
        .context("failed to load or create the key material file")?;

    // scrypt is deliberately slow; keep it off the async runtime.
    let key = tokio::task::spawn_blocking(move || crypto::derive_key(&material))
        .await
        .context("key derivation task failed")?
        .context("failed to derive the vault key")?;
    let vault = Vault::new(key);
    let store = CredentialStore::new(&config.data_dir);

    let setup_needed = !store.master_exists().await;
    if setup_needed {
        info!("no master passphrase found, entering first-run setup mode");
    } else if let Err(e) = store.load_users(&vault).await {
        error!(
            error = %e,
            "user credential file cannot be read; user sign-ins will fail until this is resolved"
        );
    }
    let setup_flag = Arc::new(AtomicBool::new(setup_needed));

    let (program, args) = config.app_command.split_first().map_or_else(
        || ("./server".to_owned(), Vec::new()),
        |(program, args)| (program.clone(), args.to_vec()),
    );
    let supervisor = Arc::new(Supervisor::new(
        AppProcessConfig {
            program,
            args,
            internal_port: config.internal_port,
            public_port: config.public_addr.port(),
            restart_delay: config.restart_delay,
            term_timeout: config.term_timeout,
        },
        Arc::clone(&setup_flag),
    ));

    Ok(Arc::new(GatewayState {
        vault,
        store,
        setup_needed: setup_flag,
        supervisor,
        proxy: ProxyClient::new(config.internal_port),
        config: config.clone(),
    }))
}

/// Assemble the router: gateway routes, master guard, access middleware,
/// proxy fallback, and the ambient layers.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let user_admin = routes::user_admin::router()
        .route_layer(axum_mw::from_fn(routes::user_admin::require_master));

    Router::new()
        .merge(routes::setup::router())
        .merge(routes::login::router())
        .nest("/user-admin", user_admin)
        .fallback(proxy::proxy_handler)
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            access::access_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state)
}

/// Turn a handler panic into the styled 500 page instead of a dropped
/// connection.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response<Full<Bytes>> {
    let detail = err
        .downcast_ref::<String>()
        .map_or_else(|| (*err.downcast_ref::<&str>().unwrap_or(&"")).to_owned(), Clone::clone);
    error!(panic = %detail, "request handler panicked");

    let mut response = Response::new(Full::from(pages::render_internal_error()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}
