//! Cooperative cancellation for reconciliation work.
//!
//! A [`ShutdownController`] owns the signal; every task carries a cheap
//! [`Context`] clone and checks it before each storage call.

use futures::future;
use tokio::{signal, sync::watch};

use crate::error::{Error, Result};

/// Triggers cancellation of every [`Context`] subscribed to it.
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Get a context that will observe shutdown.
    pub fn subscribe(&self) -> Context {
        Context {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for SIGINT: {e}");
                future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to listen for SIGTERM: {e}");
                    future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// The ambient context of a unit of work: currently just its cancellation signal.
#[derive(Debug, Clone)]
pub struct Context {
    rx: watch::Receiver<bool>,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail with [`Error::Cancelled`] if the context has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once the context is cancelled. Never resolves for a context
    /// whose controller has gone away without cancelling it.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                future::pending::<()>().await;
            }
        }
    }
}
