//! Gateway configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `SHAREGATE_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the public HTTP listener binds to.
    pub public_addr: SocketAddr,
    /// Loopback port the supervised application listens on; proxy target.
    pub internal_port: u16,
    /// Directory holding the key-material and credential files.
    pub data_dir: PathBuf,
    /// Command line used to spawn the supervised application.
    pub app_command: Vec<String>,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Session cookie lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Whether to skip `mlock` (for development without root/`CAP_IPC_LOCK`).
    pub disable_mlock: bool,
    /// Delay before restarting the application after an unexpected exit.
    pub restart_delay: Duration,
    /// Grace period between SIGTERM and SIGKILL during shutdown.
    pub term_timeout: Duration,
    /// Hard deadline for the whole shutdown sequence.
    pub shutdown_deadline: Duration,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SHAREGATE_BIND_ADDR` — full public bind address (overrides `SHAREGATE_PUBLIC_PORT`, default: `127.0.0.1:8100`)
    /// - `SHAREGATE_PUBLIC_PORT` — public port, binds to `0.0.0.0` (default: `8100`)
    /// - `SHAREGATE_INTERNAL_PORT` — loopback port of the supervised app (default: `3000`)
    /// - `SHAREGATE_DATA_DIR` — directory for key material and credentials (default: `./data`)
    /// - `SHAREGATE_APP_COMMAND` — whitespace-split command line for the app (default: `./server`)
    /// - `SHAREGATE_LOG_LEVEL` — log filter (default: `info`)
    /// - `SHAREGATE_SESSION_TTL_SECS` — cookie lifetime (default: `28800`, eight hours)
    /// - `SHAREGATE_DISABLE_MLOCK` — skip `mlockall` for dev environments (default: `false`)
    #[must_use]
    pub fn from_env() -> Self {
        let public_addr = Self::resolve_public_addr(
            std::env::var("SHAREGATE_BIND_ADDR").ok(),
            std::env::var("SHAREGATE_PUBLIC_PORT").ok(),
        );

        let internal_port =
            Self::resolve_internal_port(std::env::var("SHAREGATE_INTERNAL_PORT").ok());

        let data_dir = std::env::var("SHAREGATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let app_command: Vec<String> = std::env::var("SHAREGATE_APP_COMMAND")
            .unwrap_or_else(|_| "./server".to_owned())
            .split_whitespace()
            .map(str::to_owned)
            .collect();

        let log_level = std::env::var("SHAREGATE_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        let session_ttl_secs = std::env::var("SHAREGATE_SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(28_800);

        let disable_mlock = std::env::var("SHAREGATE_DISABLE_MLOCK")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            public_addr,
            internal_port,
            data_dir,
            app_command,
            log_level,
            session_ttl_secs,
            disable_mlock,
            restart_delay: Duration::from_secs(5),
            term_timeout: Duration::from_secs(3),
            shutdown_deadline: Duration::from_secs(10),
        }
    }

    /// Priority: `SHAREGATE_BIND_ADDR` > `SHAREGATE_PUBLIC_PORT` > default
    /// `127.0.0.1:8100`. An unparseable value falls back to the default and
    /// warns on stderr (logging is not initialized yet at this point).
    #[allow(clippy::print_stderr)]
    fn resolve_public_addr(bind_addr: Option<String>, public_port: Option<String>) -> SocketAddr {
        let default = SocketAddr::from(([127, 0, 0, 1], 8100));
        if let Some(addr) = bind_addr {
            return addr.parse().unwrap_or_else(|_| {
                eprintln!(
                    "WARNING: ignoring unparseable SHAREGATE_BIND_ADDR {addr:?}, binding {default}"
                );
                default
            });
        }
        if let Some(port) = public_port {
            return match port.parse() {
                Ok(port) => SocketAddr::from(([0, 0, 0, 0], port)),
                Err(_) => {
                    eprintln!(
                        "WARNING: ignoring unparseable SHAREGATE_PUBLIC_PORT {port:?}, binding {default}"
                    );
                    default
                }
            };
        }
        default
    }

    #[allow(clippy::print_stderr)]
    fn resolve_internal_port(raw: Option<String>) -> u16 {
        match raw {
            Some(value) => value.parse().unwrap_or_else(|_| {
                eprintln!(
                    "WARNING: ignoring unparseable SHAREGATE_INTERNAL_PORT {value:?}, using 3000"
                );
                3000
            }),
            None => 3000,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Env-var reads are process-global, so these tests exercise the
    // resolvers directly instead of mutating the environment.
    #[test]
    fn defaults_are_sane() {
        let config = GatewayConfig::from_env();
        assert!(config.internal_port > 0);
        assert!(!config.app_command.is_empty());
        assert!(config.session_ttl_secs > 0);
        assert!(config.shutdown_deadline > config.term_timeout);
    }

    #[test]
    fn bind_addr_wins_over_public_port() {
        let addr = GatewayConfig::resolve_public_addr(
            Some("10.0.0.5:9000".to_owned()),
            Some("1234".to_owned()),
        );
        assert_eq!(addr, SocketAddr::from(([10, 0, 0, 5], 9000)));
    }

    #[test]
    fn public_port_binds_all_interfaces() {
        let addr = GatewayConfig::resolve_public_addr(None, Some("9000".to_owned()));
        assert_eq!(addr, SocketAddr::from(([0, 0, 0, 0], 9000)));
    }

    #[test]
    fn unparseable_bind_addr_falls_back_to_default() {
        let addr = GatewayConfig::resolve_public_addr(Some("not-an-addr".to_owned()), None);
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 8100)));
    }

    #[test]
    fn unparseable_public_port_falls_back_to_default() {
        let addr = GatewayConfig::resolve_public_addr(None, Some("eight".to_owned()));
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 8100)));
    }

    #[test]
    fn unparseable_internal_port_falls_back_to_default() {
        assert_eq!(GatewayConfig::resolve_internal_port(Some("abc".to_owned())), 3000);
        assert_eq!(GatewayConfig::resolve_internal_port(None), 3000);
    }
}
