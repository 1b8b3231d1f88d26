//! Signal handling for SIGTERM and SIGINT.
//!
//! A signal cancels the run token. The executor abandons the in-flight request,
//! the transaction guard rolls the run back, and the process exits non-zero.
//! SIGKILL cannot be handled; a killed run leaves its directory behind.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token cancelled on shutdown
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Cancel the run without waiting for a signal
    pub fn trigger(&self) {
        self.cancel_token.cancel();
    }

    /// Spawn a task that cancels the token on SIGINT or SIGTERM
    pub fn listen(&self) -> JoinHandle<()> {
        let token = self.cancel_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => {
                    warn!("Shutdown requested, aborting backup run...");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            warn!("Received SIGTERM");
        }
    }
}
