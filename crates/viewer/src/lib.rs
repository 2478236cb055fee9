//! Viewer surface of the splatpipe pipeline.
//!
//! The viewer is the client end of the message channel: it pulls chunked
//! downloads from the host ([`DownloadDriver`]), picks how to obtain a
//! file from an ordered list of named strategies ([`Loader`]), slices
//! edited payloads back into upload chunks ([`UploadSlicer`]), and hands
//! vertex data to the renderer through a pooled buffer interface
//! ([`BufferPool`]). The consuming application signals when it is ready
//! to accept data through a one-shot [`ReadySignal`] instead of being
//! polled.

mod driver;
mod pool;
mod ready;
mod slicer;
mod strategy;

pub use driver::{DownloadDriver, LoadedModel};
pub use pool::{BufferHandle, BufferPool, BufferUsage, VertexBuffers};
pub use ready::{ReadySignal, ReadyWaiter, ready_signal};
pub use slicer::UploadSlicer;
pub use strategy::{
    ChunkStreaming, DirectRead, FilePlan, LegacyChunked, LoadFuture, LoadStrategy, Loader,
};

use splatpipe_protocol::ChannelClosed;
use splatpipe_transfer::TransferError;

/// Errors surfaced by viewer-side components.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Channel(#[from] ChannelClosed),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("host reported a transfer fault: {0}")]
    HostFault(String),

    #[error("save was cancelled at the destination picker")]
    SaveCancelled,

    #[error("every load strategy failed: {0}")]
    AllStrategiesFailed(String),
}
