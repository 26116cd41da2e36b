//! Shared application state.
//!
//! A single [`GatewayState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. The only mutable piece is `setup_needed`: it is
//! probed once at startup and flipped to `false` by the setup route after
//! the master passphrase is saved. Everything else is read-only after
//! construction.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use sharegate_vault::crypto::Vault;
use sharegate_vault::store::CredentialStore;

use crate::config::GatewayConfig;
use crate::proxy::ProxyClient;
use crate::supervisor::Supervisor;

/// Shared state passed to all HTTP handlers.
pub struct GatewayState {
    /// Encryption barrier for credential blobs.
    pub vault: Vault,
    /// The two-file credential store.
    pub store: CredentialStore,
    /// Whether the gateway is still waiting for first-run setup. Shared with
    /// the supervisor so a crashed app is not restarted mid-setup.
    pub setup_needed: Arc<AtomicBool>,
    /// Child-process supervisor for the main application.
    pub supervisor: Arc<Supervisor>,
    /// Reverse-proxy client pointed at the internal port.
    pub proxy: ProxyClient,
    /// Startup configuration.
    pub config: GatewayConfig,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState").finish_non_exhaustive()
    }
}
