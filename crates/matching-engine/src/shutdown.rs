//! Cooperative shutdown via a tree of cancellation tokens.
//!
//! The root token is cancelled on SIGINT/SIGTERM; every long-running task
//! (command consumer, snapshot pump) holds a child token derived from it, so
//! cancelling the root cancels all children, but a child can never cancel
//! its siblings.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct ShutdownController {
    root: CancellationToken,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        Self { root: CancellationToken::new() }
    }

    /// A cancellation token for a subsystem, linked to the root: cancelling
    /// the root cancels this token too.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Cancels the root token directly, e.g. in response to an unrecoverable error.
    pub fn trigger(&self) {
        self.root.cancel();
    }

    /// Waits for SIGINT (ctrl-c) or, on unix, SIGTERM, then cancels the root token.
    pub async fn wait_for_shutdown_signal(&self) {
        let ctrl_c = async {
            signal::ctrl_c().await.expect("failed to install SIGINT handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
        }

        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_token_cancelled_with_root() {
        let controller = ShutdownController::new();
        let child = controller.child_token();
        assert!(!child.is_cancelled());
        controller.trigger();
        assert!(child.is_cancelled());
    }
}
