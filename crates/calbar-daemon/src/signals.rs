//! Shutdown signaling.
//!
//! SIGINT/SIGTERM flip a `watch` channel that every long-lived task
//! selects on. Shutdown is never logged as an error.

use tokio::sync::watch;
use tracing::info;

/// Broadcasts process shutdown to all tasks.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// A receiver whose `changed()` resolves on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Requests shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// True once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Spawns the OS signal listener that triggers shutdown on
    /// SIGINT/SIGTERM.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        use tokio::signal::unix::{SignalKind, signal};

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut sigint =
                signal(SignalKind::interrupt()).expect("install SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
            let _ = tx.send(true);
        });
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received interrupt, shutting down");
                let _ = tx.send(true);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_reaches_subscribers() {
        let handle = ShutdownHandle::new();
        let mut rx = handle.subscribe();

        assert!(!handle.is_shutdown());
        handle.shutdown();

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let handle = ShutdownHandle::new();
        let mut rx1 = handle.subscribe();
        let mut rx2 = handle.subscribe();

        handle.shutdown();
        rx1.changed().await.unwrap();
        rx2.changed().await.unwrap();
    }
}
