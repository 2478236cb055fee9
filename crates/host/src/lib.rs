//! Host surface of the splatpipe pipeline.
//!
//! The host owns durable storage: it normalizes sources through the
//! artifact cache, serves chunk requests, runs the legacy push-mode
//! stream, and commits uploads from the viewer. Everything hangs off a
//! [`HostSurface`] value: the session registry, the save table and the
//! channel sender are plain fields passed by reference into handlers, not
//! process-wide state.

mod dialog;
mod registry;
mod surface;

pub use dialog::{DestinationPicker, DialogFuture, FileDialog, PickFuture};
pub use registry::SessionRegistry;
pub use surface::{Document, HostSurface};

use splatpipe_cache::CacheError;
use splatpipe_protocol::ChannelClosed;
use splatpipe_transfer::TransferError;

/// Errors surfaced by host-side handlers.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Channel(#[from] ChannelClosed),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a download session is already active for document {0}")]
    SessionActive(String),

    #[error("destination picker was cancelled")]
    DialogCancelled,
}
