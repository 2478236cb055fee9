//! One-shot readiness handshake with the consuming application.
//!
//! The renderer completes the signal exactly once when its import entry
//! point exists; the loader awaits the other half instead of polling on
//! a timer.

use tokio::sync::oneshot;

use crate::ViewerError;

/// Completion half, held by the consuming application.
#[derive(Debug)]
pub struct ReadySignal {
    tx: oneshot::Sender<()>,
}

impl ReadySignal {
    /// Marks the consumer ready. Consumes the signal, so it can fire
    /// only once.
    pub fn notify(self) {
        // The waiter may already be gone; nothing left to tell it then.
        let _ = self.tx.send(());
    }
}

/// Waiting half, held by the loader.
#[derive(Debug)]
pub struct ReadyWaiter {
    rx: oneshot::Receiver<()>,
}

impl ReadyWaiter {
    /// Suspends until the consumer signals readiness.
    ///
    /// A signal dropped without firing means the consumer went away;
    /// that surfaces as a closed channel rather than hanging forever.
    pub async fn wait(self) -> Result<(), ViewerError> {
        self.rx.await.map_err(|_| ViewerError::Channel(splatpipe_protocol::ChannelClosed))
    }
}

/// Creates a connected signal/waiter pair.
pub fn ready_signal() -> (ReadySignal, ReadyWaiter) {
    let (tx, rx) = oneshot::channel();
    (ReadySignal { tx }, ReadyWaiter { rx })
}
