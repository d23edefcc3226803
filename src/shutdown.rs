//! Graceful shutdown coordination.
//!
//! Signals the dispatcher and snapshot worker via a `tokio::sync::watch`
//! rather than a `CancellationToken`: both consumers just need the
//! latest boolean, not a tree of cancellation scopes (see DESIGN.md).

use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Waits for SIGINT/SIGTERM, then flips the shared shutdown flag.
    pub async fn wait_for_signal(&self) {
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
            _ = ctrl_c => info!("received SIGINT"),
            _ = terminate => info!("received SIGTERM"),
        }

        let _ = self.tx.send(true);
    }

    /// Waits up to `drain_timeout` for the dispatcher and snapshot
    /// worker tasks to finish their current tick, then closes the
    /// database pool regardless of whether they finished in time.
    pub async fn drain(&self, workers: Vec<JoinHandle<()>>, drain_timeout: Duration) {
        info!("draining background workers...");
        for handle in workers {
            if timeout(drain_timeout, handle).await.is_err() {
                warn!("a background worker did not stop within the drain timeout");
            }
        }
        info!("background workers drained");
    }
}
