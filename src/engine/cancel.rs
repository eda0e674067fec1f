//! Cancellation shared by every run of one invocation
//!
//! A [`Cancel`] is a cheap handle on a `watch` channel. Once the trigger
//! fires, every clone observes it, including clones made afterwards, so a
//! run started after Ctrl-C still sees the interrupt.

use crate::error::Result;
use tokio::sync::watch;

/// Fires a [`Cancel`]
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    /// Cancel every handle created from this trigger
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes a cancellation
#[derive(Debug, Clone)]
pub struct Cancel {
    rx: watch::Receiver<bool>,
}

impl Cancel {
    /// Create a trigger and its handle
    pub fn new() -> (CancelTrigger, Cancel) {
        let (tx, rx) = watch::channel(false);
        (CancelTrigger { tx }, Cancel { rx })
    }

    /// Handle that never fires
    pub fn never() -> Cancel {
        Cancel::new().1
    }

    /// Handle fired by SIGINT
    ///
    /// The signal handler is installed before this returns. Further
    /// interrupts while cleanup is under way are logged and ignored.
    pub fn on_interrupt() -> Result<Cancel> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupts = signal(SignalKind::interrupt())?;
        let (trigger, cancel) = Cancel::new();

        tokio::spawn(async move {
            if interrupts.recv().await.is_none() {
                return;
            }
            tracing::info!("Interrupted, cleaning up");
            trigger.cancel();
            while interrupts.recv().await.is_some() {
                tracing::warn!("Already stopping, waiting for cleanup");
            }
        });

        Ok(cancel)
    }

    /// Whether the trigger has fired
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Complete once the trigger fires
    ///
    /// A dropped trigger can no longer fire, so this then never completes.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
