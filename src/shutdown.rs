//! Graceful shutdown handling.
//!
//! A [`ShutdownCoordinator`] is shared between the OS signal listener and the
//! HTTP server; the server stops accepting connections once it fires and
//! drains in-flight requests for at most [`ShutdownCoordinator::timeout`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Maximum time to wait for in-flight requests before exiting.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown coordinator for managing graceful service termination.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    /// Watch channel for checking if shutdown is in progress.
    shutdown_watch: watch::Receiver<bool>,
    /// Internal sender for watch channel.
    shutdown_watch_tx: Arc<watch::Sender<bool>>,
    /// Flag indicating if shutdown has been initiated.
    is_shutting_down: Arc<AtomicBool>,
    /// Drain timeout.
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Create a coordinator with a custom drain timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let (shutdown_watch_tx, shutdown_watch) = watch::channel(false);

        Self {
            shutdown_watch,
            shutdown_watch_tx: Arc::new(shutdown_watch_tx),
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    /// Check if shutdown is in progress.
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Initiate shutdown. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating graceful shutdown");
            let _ = self.shutdown_watch_tx.send(true);
        }
    }

    /// Wait for the shutdown signal (for use in select! macros).
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_watch.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates OS signals into a coordinator shutdown.
pub struct SignalHandler {
    coordinator: ShutdownCoordinator,
}

impl SignalHandler {
    pub fn new(coordinator: ShutdownCoordinator) -> Self {
        Self { coordinator }
    }

    /// Wait for SIGINT or SIGTERM, then trigger shutdown.
    #[cfg(unix)]
    pub async fn run(self) {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        self.coordinator.shutdown();
    }

    /// Wait for Ctrl+C, then trigger shutdown.
    #[cfg(windows)]
    pub async fn run(self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        info!("Received Ctrl+C");
        self.coordinator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_coordinator_new() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());
        assert_eq!(coordinator.timeout(), DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let coordinator = ShutdownCoordinator::with_timeout(Duration::from_secs(1));
        coordinator.shutdown();
        coordinator.shutdown();
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_wakes_clones() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = coordinator.clone();

        let task = tokio::spawn(async move { waiter.wait_for_shutdown().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.shutdown();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_returns_immediately() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();
        tokio::time::timeout(Duration::from_millis(100), coordinator.wait_for_shutdown())
            .await
            .unwrap();
    }
}
