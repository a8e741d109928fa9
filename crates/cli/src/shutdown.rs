use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Listens for SIGINT and SIGTERM and cancels the run token.
///
/// `run` names the strategy pair being timed so the shutdown line in the log
/// says which benchmark was interrupted.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    shutdown_requested: Arc<AtomicBool>,
    run: Arc<str>,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken, run: impl Into<Arc<str>>) -> Self {
        Self {
            cancel_token,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            run: run.into(),
        }
    }

    pub fn register_handlers(&self) {
        let coordinator = self.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                signal::ctrl_c()
                    .await
                    .expect("Failed to install SIGINT handler");
            };

            #[cfg(unix)]
            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            let received = tokio::select! {
                _ = ctrl_c => "SIGINT",
                _ = terminate => "SIGTERM",
            };
            coordinator.request_shutdown(received);
        });
    }

    /// Flags the shutdown and cancels the run. Only the first request is logged.
    pub fn request_shutdown(&self, signal: &str) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let run_state = if self.cancel_token.is_cancelled() {
            "already cancelled"
        } else {
            "running"
        };
        info!(run = %self.run, signal, run_state, "Shutdown requested, cancelling the run");
        self.cancel_token.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Exit codes for the CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
    ShutdownRequested = 130, // Standard exit code for SIGINT
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
