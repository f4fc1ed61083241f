//! Stop wiring for the `run` command.
//!
//! One [`RunStop`] fans a single stop flag out to the ingester, the expiry
//! sweep and the metrics server. SIGINT/SIGTERM flips it, and so does the
//! runner itself when the ingester exits on its own (lost stream lease).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Shared stop flag for every task spawned by `run`.
#[derive(Clone)]
pub struct RunStop {
    tx: Arc<watch::Sender<bool>>,
}

impl RunStop {
    /// Creates a stop flag that nothing triggers except [`RunStop::trigger`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Creates a stop flag that is also triggered by SIGINT or SIGTERM.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_os_signals() -> Self {
        let stop = Self::new();
        let on_signal = stop.clone();
        tokio::spawn(async move {
            let signal = wait_for_os_signal().await;
            info!(signal, "Stopping runner");
            on_signal.trigger();
        });
        stop
    }

    /// Receiver handed to a runner task; resolves `changed()` once stopped.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flips the flag. Later calls are no-ops.
    pub fn trigger(&self) {
        self.tx.send_if_modified(|stopped| !std::mem::replace(stopped, true));
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for RunStop {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves with the name of the first of SIGINT/SIGTERM to arrive.
async fn wait_for_os_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_every_subscriber() {
        let stop = RunStop::new();
        let mut ingest_rx = stop.subscribe();
        let mut sweep_rx = stop.subscribe();
        assert!(!*ingest_rx.borrow());

        stop.clone().trigger();

        tokio::time::timeout(Duration::from_secs(1), ingest_rx.changed())
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), sweep_rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*ingest_rx.borrow());
        assert!(stop.is_stopped());
    }

    #[tokio::test]
    async fn test_trigger_notifies_once() {
        let stop = RunStop::new();
        let mut rx = stop.subscribe();

        stop.trigger();
        rx.changed().await.unwrap();
        stop.trigger();

        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_stop() {
        let stop = RunStop::with_os_signals();
        assert!(!stop.is_stopped());

        stop.trigger();
        let rx = stop.subscribe();
        assert!(*rx.borrow());
    }
}
