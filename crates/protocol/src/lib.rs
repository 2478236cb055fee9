//! Wire protocol for splatpipe host-viewer communication.
//!
//! The host process and the embedded viewer surface talk over a narrow,
//! message-oriented channel that cannot carry raw file handles. Every
//! message is a tagged JSON object; the full taxonomy is the closed
//! [`Message`] enum, so dispatch is an exhaustive `match` rather than a
//! string switch. No delivery ordering is assumed across message types:
//! every stateful transition downstream is keyed by an explicit index or
//! request id, never by arrival order.

pub mod channel;
pub mod messages;
pub mod types;

pub use channel::{ChannelClosed, Receiver, Sender, channel};
pub use messages::Message;
pub use types::{DeliveryMode, SessionState};

/// Upper bound on a single encoded message, in bytes.
///
/// Large enough for a 64 MiB chunk payload after base64 expansion (4/3)
/// plus envelope overhead.
pub const MAX_MESSAGE_SIZE: usize = 96 * 1024 * 1024;
