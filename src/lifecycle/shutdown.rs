//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Any number of tasks can hold a [`ShutdownSignal`]. Signals created after the
/// trigger resolve immediately, so late subscribers never hang.
#[derive(Debug)]
pub struct Shutdown {
    closing: AtomicBool,
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            closing: AtomicBool::new(false),
            tx,
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger shutdown. Returns `true` only for the call that flipped the flag.
    pub fn trigger(&self) -> bool {
        if self
            .closing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.tx.send_replace(true);
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to long-running tasks.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered.
    pub async fn cancelled(&mut self) {
        // A dropped sender also means nobody is left to keep us running.
        let _ = self.rx.wait_for(|closing| *closing).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
