//! Cooperative shutdown shared by all consumer loops.
//!
//! A single watch channel fans out to every component; each blocking point
//! sits under `tokio::select!` with the shutdown branch so an in-flight
//! message is dropped without committing its offset.

use tokio::sync::watch;

/// Receiving half of the shutdown signal, cloned into every worker.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending half, owned by the stop-signal task spawned in `main`.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Creates a connected shutdown pair.
pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl ShutdownHandle {
    /// Signals all workers to drain and stop.
    pub fn trigger(&self) {
        // Receivers may already be gone during teardown.
        let _ = self.tx.send(true);
    }

    /// Triggers the drain when the process is told to stop (Ctrl+C, or
    /// SIGTERM on Unix). Consumes the handle: once the drain starts there
    /// is nothing further to send.
    pub async fn trigger_on_signal(self) {
        wait_for_stop_request().await;
        log::info!("Stop requested; draining consumer loops");
        self.trigger();
    }
}

#[cfg(unix)]
async fn wait_for_stop_request() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = term.recv() => {}
                _ = interrupt() => {}
            }
        }
        Err(e) => {
            log::warn!("No SIGTERM handler ({}), stopping on Ctrl+C only", e);
            interrupt().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_request() {
    interrupt().await;
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // With no interrupt hook the process cannot stop cleanly; park this
        // task and leave termination to the orchestrator.
        log::error!("No Ctrl+C handler ({}); clean stop disabled", e);
        std::future::pending::<()>().await;
    }
}

impl Shutdown {
    /// Resolves once shutdown has been triggered. Cancel-safe.
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                // Sender dropped: treat as shutdown.
                return;
            }
        }
    }

    /// Non-blocking check used between pipeline stages.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
