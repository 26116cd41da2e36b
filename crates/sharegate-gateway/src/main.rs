//! Sharegate entry point.
//!
//! Bootstraps the vault and credential store, starts the supervised
//! application (unless setup is pending), then serves the public listener
//! with graceful shutdown. On SIGINT/SIGTERM the child gets SIGTERM, three
//! seconds of grace, then SIGKILL; a ten-second watchdog force-exits the
//! process if anything in the teardown hangs.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use sharegate_gateway::app;
use sharegate_gateway::config::GatewayConfig;
use sharegate_gateway::hardening::{self, HardeningError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment.
    let config = GatewayConfig::from_env();

    // Production hardening runs before logging is initialized, so warnings
    // go through eprintln.
    apply_hardening(&config);

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        data_dir = %config.data_dir.display(),
        internal_port = config.internal_port,
        "Sharegate starting"
    );

    let state = app::build_state(&config).await?;
    let router = app::build_router(Arc::clone(&state));

    if state.setup_needed.load(Ordering::SeqCst) {
        info!(
            "setup pending: visit http://{}/setup to choose a master passphrase",
            config.public_addr
        );
    } else {
        state.supervisor.start().await;
    }

    let listener = TcpListener::bind(config.public_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.public_addr))?;
    info!(addr = %config.public_addr, "Sharegate listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_deadline))
        .await
        .context("server error")?;

    info!("stopping the application");
    state.supervisor.shutdown().await;

    info!("Sharegate stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then arm the hard-deadline watchdog.
async fn shutdown_signal(deadline: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");

    // If in-flight requests or the child refuse to die, exit anyway.
    tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        error!(deadline = ?deadline, "shutdown deadline exceeded, forcing exit");
        std::process::exit(1);
    });
}

/// Apply production hardening before logging is initialized.
///
/// Uses `eprintln` because structured logging is not yet available.
#[allow(clippy::print_stderr)]
fn apply_hardening(config: &GatewayConfig) {
    if config.disable_mlock {
        eprintln!(
            "WARNING: mlock disabled via SHAREGATE_DISABLE_MLOCK — key material may be swapped to disk"
        );
    }
    match hardening::harden(config) {
        Ok(()) => {}
        Err(e @ HardeningError::MemoryLock(_)) => {
            eprintln!("WARNING: {e} (set SHAREGATE_DISABLE_MLOCK=true for dev)");
        }
        Err(e) => eprintln!("WARNING: {e}"),
    }
}
