//! In-process message channel between the host and viewer surfaces.
//!
//! The real transport is owned by the embedding application (a webview
//! bridge, a socket, anything that moves tagged messages). This module is
//! the in-memory stand-in the crates in this workspace program against:
//! an unbounded duplex with no ordering promise across message types.

use tokio::sync::mpsc;

use crate::messages::Message;

/// The peer hung up; the message was not delivered.
#[derive(Debug, thiserror::Error)]
#[error("message channel closed")]
pub struct ChannelClosed;

/// Sending half of a message channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Sender {
    tx: mpsc::UnboundedSender<Message>,
}

impl Sender {
    /// Queues a message for the peer.
    pub fn send(&self, msg: Message) -> Result<(), ChannelClosed> {
        self.tx.send(msg).map_err(|_| ChannelClosed)
    }

    /// Returns `true` while the peer can still receive.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving half of a message channel.
#[derive(Debug)]
pub struct Receiver {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Receiver {
    /// Waits for the next message; `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Non-blocking receive for tests and drain loops.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// Creates one direction of the channel.
///
/// A full duplex is two calls: `let (to_viewer, from_host) = channel();`
/// and `let (to_host, from_viewer) = channel();`.
pub fn channel() -> (Sender, Receiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sender { tx }, Receiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{FileInfo, Message};

    #[tokio::test]
    async fn send_and_receive() {
        let (tx, mut rx) = channel();
        tx.send(Message::ModelRefresh).unwrap();
        tx.send(Message::FileInfo(FileInfo {
            file_name: "a.ply".into(),
            file_size: 1,
        }))
        .unwrap();

        assert_eq!(rx.recv().await, Some(Message::ModelRefresh));
        match rx.recv().await {
            Some(Message::FileInfo(info)) => assert_eq!(info.file_name, "a.ply"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_after_receiver_drop_fails() {
        let (tx, rx) = channel();
        assert!(tx.is_connected());
        drop(rx);
        assert!(!tx.is_connected());
        assert!(tx.send(Message::ModelRefresh).is_err());
    }

    #[tokio::test]
    async fn recv_none_after_sender_drop() {
        let (tx, mut rx) = channel();
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
