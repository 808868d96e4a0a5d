//! Periodic promotion sweeps
//!
//! The activator owns the clock: on a fixed interval it asks the manager to
//! drain due entries from the activation cache into the dispatch queue.
//! Nothing else in the core polls time, so tests drive promotion manually by
//! calling [`UriManager::sweep`] with an explicit timestamp instead of
//! running an activator.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::manager::UriManager;

/// Background task promoting due URIs on a fixed interval
pub struct Activator {
    manager: Arc<UriManager>,
    interval: std::time::Duration,
    shutdown_tx: watch::Sender<bool>,
    // Held so the channel always has a receiver; a shutdown signalled before
    // the sweep task starts must not be dropped
    shutdown_rx: watch::Receiver<bool>,
}

impl Activator {
    /// Create an activator over a manager
    pub fn new(manager: Arc<UriManager>, interval: std::time::Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            manager,
            interval,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Run sweeps until shutdown is signalled
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            tracing::info!("activator not starting, already shut down");
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so startup is quiet
        ticker.tick().await;

        tracing::info!(interval_secs = self.interval.as_secs(), "activator started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let promoted = self.manager.sweep(Utc::now()).await;
                    if promoted > 0 {
                        tracing::debug!(promoted, "promotion sweep");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("activator stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Spawn the sweep loop onto the runtime
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let activator = Arc::clone(self);
        tokio::spawn(async move { activator.run().await })
    }

    /// Signal the sweep loop to stop after its current iteration.
    ///
    /// Safe to call before the loop is spawned; the signal is kept and
    /// observed at startup.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}
