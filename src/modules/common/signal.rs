//! Process shutdown coordination.
//!
//! One task owns the OS signal handlers and rebroadcasts termination over a
//! channel, so the HTTP server and every background loop observe the same
//! shutdown event.

use std::sync::LazyLock;

use crate::modules::{error::NuboResult, Initialize};
use tokio::signal;
use tokio::sync::broadcast;

pub static SIGNAL_MANAGER: LazyLock<SignalManager> = LazyLock::new(SignalManager::new);

pub struct SignalManager {
    sender: broadcast::Sender<()>,
}

impl SignalManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        SignalManager { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }
}

impl Initialize for SignalManager {
    async fn initialize() -> NuboResult<()> {
        tokio::spawn({
            async move {
                termination_signal().await;
                println!("\nSending shutdown signal...");
                let _ = SIGNAL_MANAGER.sender.send(());
            }
        });
        Ok(())
    }
}

/// Resolves when the process is asked to stop (Ctrl+C, or SIGTERM on unix).
pub async fn shutdown_signal() {
    let mut shutdown = SIGNAL_MANAGER.subscribe();
    let _ = shutdown.recv().await;
}

async fn termination_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Error installing Ctrl+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Error installing terminate signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}
