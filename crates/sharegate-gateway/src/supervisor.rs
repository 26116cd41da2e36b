//! Child-process supervisor for the main application.
//!
//! The supervisor owns the lifecycle of the file-sharing app: spawn with the
//! internal port injected via environment, restart after a delay on
//! unexpected exit, and a SIGTERM → grace period → SIGKILL escalation on
//! shutdown. Exactly one monitor task owns the [`Child`] handle at a time;
//! the rest of the gateway talks to it through watch channels, so there is
//! no way to double-spawn or signal a reaped pid.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

/// Lifecycle states, observable via [`Supervisor::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// How to spawn and manage the application process.
#[derive(Debug, Clone)]
pub struct AppProcessConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Loopback port the app must listen on; injected as `PORT`.
    pub internal_port: u16,
    /// The gateway's public port; injected as `GATEWAY_PUBLIC_PORT` so the
    /// app can build absolute URLs.
    pub public_port: u16,
    /// Delay before restarting after an unexpected exit.
    pub restart_delay: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub term_timeout: Duration,
}

/// Handle to the currently running child, held while the monitor task owns
/// the [`Child`] itself.
struct RunningChild {
    pid: Option<u32>,
    terminate: watch::Sender<bool>,
    exited: watch::Receiver<bool>,
}

/// The supervisor. One instance per gateway, shared via `Arc`.
pub struct Supervisor {
    config: AppProcessConfig,
    /// Set once at shutdown; suppresses restarts forever after.
    shutting_down: AtomicBool,
    /// Shared with the gateway state: while setup is pending, the app is
    /// not started and exits are not followed by restarts.
    setup_needed: Arc<AtomicBool>,
    state: watch::Sender<SupervisorState>,
    child: Mutex<Option<RunningChild>>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: AppProcessConfig, setup_needed: Arc<AtomicBool>) -> Self {
        let (state, _) = watch::channel(SupervisorState::Stopped);
        Self {
            config,
            shutting_down: AtomicBool::new(false),
            setup_needed,
            state,
            child: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Whether a child process is currently being managed.
    pub async fn is_running(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// Spawn the application if it is not already running.
    ///
    /// A no-op while a child is alive, while shutdown is in progress, or
    /// while setup is pending. Spawn failures are logged, not fatal: the
    /// gateway keeps serving its own pages and the proxy answers 502.
    // Boxed at the signature because the monitor task restarts through
    // `start`, which would otherwise make the opaque future type recursive.
    pub fn start(
        self: &Arc<Self>,
    ) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
        // Flags are checked under the child lock so a concurrent shutdown
        // cannot interleave with a spawn.
        let mut slot = self.child.lock().await;
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        if self.setup_needed.load(Ordering::SeqCst) {
            info!("setup pending, not starting the application");
            return;
        }
        if slot.is_some() {
            info!("application already running, ignoring start request");
            return;
        }
        self.state.send_replace(SupervisorState::Starting);

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .env("PORT", self.config.internal_port.to_string())
            .env("GATEWAY_PUBLIC_PORT", self.config.public_port.to_string())
            .kill_on_drop(true);

        match command.spawn() {
            Ok(child) => {
                let pid = child.id();
                let (terminate_tx, terminate_rx) = watch::channel(false);
                let (exited_tx, exited_rx) = watch::channel(false);
                *slot = Some(RunningChild {
                    pid,
                    terminate: terminate_tx,
                    exited: exited_rx,
                });
                drop(slot);

                self.state.send_replace(SupervisorState::Running);
                info!(
                    pid,
                    program = %self.config.program,
                    port = self.config.internal_port,
                    "application started"
                );

                let supervisor = Arc::clone(self);
                tokio::spawn(async move {
                    supervisor.monitor(child, terminate_rx, exited_tx).await;
                });
            }
            Err(e) => {
                self.state.send_replace(SupervisorState::Stopped);
                error!(
                    program = %self.config.program,
                    error = %e,
                    "failed to spawn the application"
                );
            }
        }
        })
    }

    /// Terminate the child and wait for it to be reaped. Idempotent:
    /// concurrent callers all wait on the same exit notification, and
    /// later calls return immediately.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let exited = {
            let slot = self.child.lock().await;
            slot.as_ref().map(|running| {
                let _ = running.terminate.send(true);
                running.exited.clone()
            })
        };

        if let Some(mut exited) = exited {
            if !*exited.borrow() {
                let _ = exited.changed().await;
            }
        }
    }

    /// Owns the child until it exits or is told to terminate. Runs as a
    /// spawned task; exactly one exists per child.
    async fn monitor(
        self: Arc<Self>,
        mut child: Child,
        mut terminate: watch::Receiver<bool>,
        exited: watch::Sender<bool>,
    ) {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => warn!(%status, "application exited unexpectedly"),
                    Err(e) => error!(error = %e, "failed waiting on the application"),
                }
                self.clear_child(&exited).await;

                if self.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                if self.setup_needed.load(Ordering::SeqCst) {
                    info!("setup pending, not restarting the application");
                    return;
                }

                info!(delay = ?self.config.restart_delay, "restarting the application");
                tokio::time::sleep(self.config.restart_delay).await;
                if !self.shutting_down.load(Ordering::SeqCst) {
                    self.start().await;
                }
            }
            _ = terminate.changed() => {
                self.state.send_replace(SupervisorState::Stopping);
                self.terminate_child(&mut child).await;
                self.clear_child(&exited).await;
            }
        }
    }

    async fn clear_child(&self, exited: &watch::Sender<bool>) {
        *self.child.lock().await = None;
        self.state.send_replace(SupervisorState::Stopped);
        exited.send_replace(true);
    }

    /// SIGTERM, wait out the grace period, then SIGKILL if still alive.
    async fn terminate_child(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            if let Ok(pid) = i32::try_from(pid) {
                // SAFETY: `kill(2)` with a pid we still own (the child has
                // not been reaped — `wait` runs below) and a constant
                // signal number. No pointers are involved.
                #[allow(unsafe_code)]
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
                info!(pid, "sent SIGTERM to the application");
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(self.config.term_timeout, child.wait()).await {
            Ok(Ok(status)) => info!(%status, "application exited"),
            Ok(Err(e)) => error!(error = %e, "failed waiting on the application"),
            Err(_) => {
                warn!(
                    timeout = ?self.config.term_timeout,
                    "application ignored SIGTERM, sending SIGKILL"
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sleeper(restart_delay: Duration) -> Arc<Supervisor> {
        Arc::new(Supervisor::new(
            AppProcessConfig {
                program: "sleep".to_owned(),
                args: vec!["30".to_owned()],
                internal_port: 3000,
                public_port: 8100,
                restart_delay,
                term_timeout: Duration::from_secs(3),
            },
            Arc::new(AtomicBool::new(false)),
        ))
    }

    #[tokio::test]
    async fn start_and_shutdown() {
        let supervisor = sleeper(Duration::from_secs(5));
        supervisor.start().await;
        assert!(supervisor.is_running().await);
        assert_eq!(supervisor.state(), SupervisorState::Running);

        supervisor.shutdown().await;
        assert!(!supervisor.is_running().await);
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn start_is_a_noop_while_running() {
        let supervisor = sleeper(Duration::from_secs(5));
        supervisor.start().await;
        let pid_before = supervisor.child.lock().await.as_ref().unwrap().pid;
        supervisor.start().await;
        let pid_after = supervisor.child.lock().await.as_ref().unwrap().pid;
        assert_eq!(pid_before, pid_after);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let supervisor = sleeper(Duration::from_secs(5));
        supervisor.start().await;
        tokio::join!(supervisor.shutdown(), supervisor.shutdown());
        supervisor.shutdown().await;
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn no_start_after_shutdown() {
        let supervisor = sleeper(Duration::from_secs(5));
        supervisor.shutdown().await;
        supervisor.start().await;
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn no_start_while_setup_pending() {
        let setup_needed = Arc::new(AtomicBool::new(true));
        let supervisor = Arc::new(Supervisor::new(
            AppProcessConfig {
                program: "sleep".to_owned(),
                args: vec!["30".to_owned()],
                internal_port: 3000,
                public_port: 8100,
                restart_delay: Duration::from_secs(5),
                term_timeout: Duration::from_secs(3),
            },
            setup_needed,
        ));
        supervisor.start().await;
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn restarts_after_unexpected_exit() {
        let supervisor = Arc::new(Supervisor::new(
            AppProcessConfig {
                program: "true".to_owned(),
                args: vec![],
                internal_port: 3000,
                public_port: 8100,
                restart_delay: Duration::from_millis(50),
                term_timeout: Duration::from_secs(3),
            },
            Arc::new(AtomicBool::new(false)),
        ));
        supervisor.start().await;
        // `true` exits immediately; after the delay a new child is spawned.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_ne!(supervisor.state(), SupervisorState::Stopping);
        supervisor.shutdown().await;
        assert!(!supervisor.is_running().await);
    }
}
