use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use uuid::Uuid;

use splatpipe_protocol::messages::{Message, RequestChunk, RequestParallelChunks};
use splatpipe_protocol::{Receiver, Sender};
use splatpipe_transfer::tiers::TRANSFER_TIMEOUT;
use splatpipe_transfer::{NextAction, TransferError, TransferSession};

use crate::ViewerError;

/// An assembled download, ready for the consuming application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModel {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Viewer-side download state machine over the message channel.
///
/// Consumes host messages until one transfer completes: either the pull
/// protocol (`startStreaming` followed by `chunkResponse` traffic the
/// driver requests chunk by chunk or batch by batch) or the legacy push
/// protocol (`fileTransferStart` followed by base64 `fileChunk`s the host
/// emits on its own). A session with no progress within the timeout is
/// abandoned; recovery is a fresh session, never a per-index re-request.
pub struct DownloadDriver {
    sender: Sender,
    timeout: Duration,
}

impl DownloadDriver {
    pub fn new(sender: Sender) -> Self {
        Self::with_timeout(sender, TRANSFER_TIMEOUT)
    }

    pub fn with_timeout(sender: Sender, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    /// Runs until one download completes or fails.
    ///
    /// `fallback_name` names the model when neither a `fileInfo` nor the
    /// transfer-start message carried a filename.
    pub async fn run(
        &self,
        receiver: &mut Receiver,
        fallback_name: &str,
    ) -> Result<LoadedModel, ViewerError> {
        let mut filename = fallback_name.to_string();
        let mut session: Option<TransferSession> = None;
        // Push mode: the host drives delivery, so the actions the session
        // suggests are never sent back as requests.
        let mut push_mode = false;

        loop {
            let msg = tokio::time::timeout(self.timeout, receiver.recv())
                .await
                .map_err(|_| {
                    if let Some(s) = session.as_mut() {
                        s.fail();
                    }
                    TransferError::TransferTimeout
                })?
                .ok_or(splatpipe_protocol::ChannelClosed)?;

            match msg {
                Message::FileInfo(info) => {
                    filename = info.file_name;
                }

                Message::StartStreaming(start) => {
                    if session.is_some() {
                        tracing::debug!("duplicate startStreaming ignored");
                        continue;
                    }
                    let name = if start.filename.is_empty() {
                        filename.clone()
                    } else {
                        start.filename
                    };
                    let mut s = TransferSession::new(
                        Uuid::new_v4().to_string(),
                        name,
                        start.file_size,
                        start.chunk_size,
                    );
                    tracing::info!(
                        total_size = start.file_size,
                        chunk_size = start.chunk_size,
                        expected = s.expected_chunks(),
                        mode = ?s.mode(),
                        "download session allocated"
                    );
                    let action = s.begin();
                    self.dispatch(&s, action)?;
                    push_mode = false;
                    session = Some(s);
                }

                Message::ChunkResponse(resp) => {
                    let Some(s) = session.as_mut() else {
                        tracing::debug!(index = resp.chunk_index, "chunk without a session");
                        continue;
                    };
                    let action = s.store_chunk(resp.chunk_index, resp.data, resp.is_last_chunk)?;
                    if action == NextAction::AssembleNow {
                        return Self::finish(s);
                    }
                    self.dispatch(s, action)?;
                }

                Message::FileTransferStart(start) => {
                    if session.is_some() {
                        tracing::warn!(
                            request = %start.request_id,
                            "already streaming, duplicate fileTransferStart ignored"
                        );
                        continue;
                    }
                    let name = if start.filename.is_empty() {
                        filename.clone()
                    } else {
                        start.filename
                    };
                    let mut s =
                        TransferSession::new(start.request_id, name, start.total_size, start.chunk_size);
                    tracing::info!(
                        total_size = start.total_size,
                        total_chunks = start.total_chunks,
                        "push-mode transfer started"
                    );
                    // The host sends every chunk unprompted; discard the
                    // opening request the session would otherwise issue.
                    let _ = s.begin();
                    push_mode = true;
                    session = Some(s);
                }

                Message::FileChunk(chunk) => {
                    let Some(s) = session.as_mut() else {
                        tracing::debug!(index = chunk.chunk_index, "push chunk without a session");
                        continue;
                    };
                    let bytes = STANDARD
                        .decode(&chunk.data)
                        .map_err(|e| TransferError::InvalidEncoding(e.to_string()))?;
                    let action = s.store_chunk(chunk.chunk_index, bytes, chunk.is_last_chunk)?;
                    if action == NextAction::AssembleNow {
                        return Self::finish(s);
                    }
                    if !push_mode {
                        self.dispatch(s, action)?;
                    }
                }

                Message::ChunkError(fault) | Message::FileError(fault) => {
                    if let Some(s) = session.as_mut() {
                        s.fail();
                    }
                    tracing::error!("host aborted the transfer: {}", fault.error);
                    return Err(ViewerError::HostFault(fault.error));
                }

                other => {
                    tracing::debug!(?other, "message unrelated to the download ignored");
                }
            }
        }
    }

    fn dispatch(&self, session: &TransferSession, action: NextAction) -> Result<(), ViewerError> {
        match action {
            NextAction::RequestChunk(index) => {
                self.sender.send(Message::RequestChunk(RequestChunk {
                    chunk_index: index,
                    chunk_size: session.chunk_size(),
                }))?;
            }
            NextAction::RequestBatch { start, width } => {
                self.sender
                    .send(Message::RequestParallelChunks(RequestParallelChunks {
                        start_chunk_index: start,
                        batch_size: width,
                        chunk_size: session.chunk_size(),
                    }))?;
            }
            NextAction::AssembleNow | NextAction::Wait => {}
        }
        Ok(())
    }

    fn finish(session: &mut TransferSession) -> Result<LoadedModel, ViewerError> {
        let bytes = session.assemble()?;
        Ok(LoadedModel {
            filename: session.filename().to_string(),
            bytes,
        })
    }
}
