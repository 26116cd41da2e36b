//! Process hardening applied before any key material enters memory.
//!
//! The gateway holds a derived AES key and, transiently, decrypted
//! passphrases. [`harden`] keeps that material off disk: it zeroes
//! `RLIMIT_CORE` so no core file can ever capture it, then pins all
//! current and future pages with `mlockall` so they cannot be swapped.
//! The mlock step needs `CAP_IPC_LOCK` (or root) on Linux and is skipped
//! when [`GatewayConfig::disable_mlock`] is set for development.
//!
//! On non-Unix platforms [`harden`] is a no-op.

use thiserror::Error;

use crate::config::GatewayConfig;

/// A hardening step that failed. Callers treat these as warnings: the
/// gateway still runs, just without the corresponding protection.
#[derive(Debug, Error)]
pub enum HardeningError {
    #[error("could not disable core dumps: setrlimit(RLIMIT_CORE, 0) failed: {0}")]
    CoreDumps(std::io::Error),
    #[error("could not pin memory: mlockall(MCL_CURRENT | MCL_FUTURE) failed: {0}")]
    MemoryLock(std::io::Error),
}

/// Apply process hardening: core dumps off, then memory pinned unless
/// `config.disable_mlock` opts out.
///
/// Call this from `main()` before the vault key is derived.
///
/// # Errors
///
/// Returns the first step that failed; a [`HardeningError::CoreDumps`]
/// failure means the mlock step was not attempted.
#[cfg(unix)]
pub fn harden(config: &GatewayConfig) -> Result<(), HardeningError> {
    let no_core = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `setrlimit` reads the `rlimit` struct we pass by reference and
    // only adjusts this process's core-dump limit. Lowering a limit to zero
    // never requires privileges.
    #[allow(unsafe_code)]
    if unsafe { libc::setrlimit(libc::RLIMIT_CORE, &no_core) } != 0 {
        return Err(HardeningError::CoreDumps(std::io::Error::last_os_error()));
    }

    if config.disable_mlock {
        return Ok(());
    }

    // SAFETY: `mlockall` takes only flag constants; insufficient privilege
    // is reported through the return value, not undefined behavior.
    #[allow(unsafe_code)]
    if unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) } != 0 {
        return Err(HardeningError::MemoryLock(std::io::Error::last_os_error()));
    }

    Ok(())
}

/// No-op on non-Unix platforms.
#[cfg(not(unix))]
pub fn harden(_config: &GatewayConfig) -> Result<(), HardeningError> {
    Ok(())
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(disable_mlock: bool) -> GatewayConfig {
        GatewayConfig {
            public_addr: std::net::SocketAddr::from(([127, 0, 0, 1], 8100)),
            internal_port: 3000,
            data_dir: std::path::PathBuf::from("."),
            app_command: vec!["./server".to_owned()],
            log_level: "info".to_owned(),
            session_ttl_secs: 28_800,
            disable_mlock,
            restart_delay: Duration::from_secs(5),
            term_timeout: Duration::from_secs(3),
            shutdown_deadline: Duration::from_secs(10),
        }
    }

    #[test]
    fn core_limit_is_zero_after_hardening() {
        // mlock needs privileges the test runner may lack; opting out still
        // has to run the core-dump step.
        harden(&config(true)).unwrap();

        let mut rlim = libc::rlimit {
            rlim_cur: 1,
            rlim_max: 1,
        };
        // SAFETY: `getrlimit` writes into the struct we pass by reference.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::getrlimit(libc::RLIMIT_CORE, &mut rlim) };
        assert_eq!(rc, 0);
        assert_eq!(rlim.rlim_cur, 0);
    }
}
