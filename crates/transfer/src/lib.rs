//! Chunked transfer of point-cloud artifacts over the message channel.
//!
//! The host side splits an artifact into byte ranges and emits them as
//! chunk messages ([`ChunkSequencer`]); the viewer side accumulates them
//! into an index-keyed slot array and reassembles ([`TransferSession`]).
//! The save direction runs the same shape in reverse ([`SaveSession`]).
//! Both ends are mirror state machines: every transition is keyed by an
//! explicit chunk index, so arrival order and duplication are harmless.

mod assembler;
mod chunk;
mod extract;
mod save;
mod sequencer;
pub mod tiers;

pub use assembler::{NextAction, TransferSession};
pub use chunk::{ChunkDescriptor, chunk_count, descriptor};
pub use extract::{carve_ply, is_zip};
pub use save::SaveSession;
pub use sequencer::ChunkSequencer;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message channel closed")]
    ChannelClosed(#[from] splatpipe_protocol::ChannelClosed),

    #[error("missing chunk {0}")]
    MissingChunk(u32),

    #[error("invalid chunk encoding: {0}")]
    InvalidEncoding(String),

    #[error("transfer timed out")]
    TransferTimeout,

    #[error("assembled data does not carry the expected format signature")]
    FormatValidationFailure,

    #[error("incomplete upload: {0}")]
    IncompleteUpload(String),

    #[error("failed to write destination: {0}")]
    WriteFailure(String),

    #[error("chunk index {index} out of range (expected < {expected})")]
    ChunkOutOfRange { index: u32, expected: u32 },
}
