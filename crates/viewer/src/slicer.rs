use std::time::Duration;

use uuid::Uuid;

use splatpipe_protocol::messages::{Message, SaveChunk, SaveCommit, SaveStart};
use splatpipe_protocol::{Receiver, Sender};
use splatpipe_transfer::chunk_count;
use splatpipe_transfer::tiers::SAVE_CHUNK_SIZE;

use crate::ViewerError;

/// Client side of the save/export direction.
///
/// Slices an edited payload into fixed-size chunks and streams the
/// three-phase upload: `save/start`, one `save/chunk` per slice keyed by
/// index, then `save/commit` carrying the exact byte length the host must
/// verify against.
pub struct UploadSlicer {
    sender: Sender,
    chunk_size: u64,
}

impl UploadSlicer {
    pub fn new(sender: Sender) -> Self {
        Self::with_chunk_size(sender, SAVE_CHUNK_SIZE)
    }

    pub fn with_chunk_size(sender: Sender, chunk_size: u64) -> Self {
        debug_assert!(chunk_size > 0);
        Self { sender, chunk_size }
    }

    /// Streams one payload to the host and returns the upload's request id.
    ///
    /// `target_path` bypasses the host's destination picker when the
    /// viewer already knows where the file belongs.
    pub fn send(
        &self,
        filename: &str,
        payload: &[u8],
        target_path: Option<&str>,
    ) -> Result<String, ViewerError> {
        let request_id = format!("save-{}", Uuid::new_v4());
        let total_chunks = chunk_count(payload.len() as u64, self.chunk_size);

        tracing::info!(
            request = %request_id,
            filename,
            total_size = payload.len(),
            total_chunks,
            "starting upload"
        );
        self.sender.send(Message::SaveStart(SaveStart {
            request_id: request_id.clone(),
            filename: filename.to_string(),
            total_size: payload.len() as u64,
            total_chunks,
            mime_type: String::new(),
        }))?;

        for (index, slice) in payload.chunks(self.chunk_size as usize).enumerate() {
            self.sender.send(Message::SaveChunk(SaveChunk {
                request_id: request_id.clone(),
                index: index as u32,
                bytes: slice.to_vec(),
            }))?;
        }

        self.sender.send(Message::SaveCommit(SaveCommit {
            request_id: request_id.clone(),
            byte_length: payload.len() as u64,
            target_path: target_path.map(str::to_string),
        }))?;
        Ok(request_id)
    }

    /// Waits for the host's verdict on an upload.
    ///
    /// Messages unrelated to the upload are skipped; the host answers
    /// with `save/done`, `saveCancelled` or a `fileError` for this
    /// request id.
    pub async fn await_done(
        receiver: &mut Receiver,
        request_id: &str,
        timeout: Duration,
    ) -> Result<String, ViewerError> {
        loop {
            let msg = tokio::time::timeout(timeout, receiver.recv())
                .await
                .map_err(|_| splatpipe_transfer::TransferError::TransferTimeout)?
                .ok_or(splatpipe_protocol::ChannelClosed)?;
            match msg {
                Message::SaveDone(done) if done.request_id == request_id => {
                    return Ok(done.location);
                }
                Message::SaveCancelled => return Err(ViewerError::SaveCancelled),
                Message::FileError(fault) if fault.request_id == request_id => {
                    return Err(ViewerError::HostFault(fault.error));
                }
                other => {
                    tracing::debug!(?other, "message unrelated to the upload ignored");
                }
            }
        }
    }
}
