use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::sync::Mutex;

use splatpipe_cache::PlyCache;
use splatpipe_protocol::Sender;
use splatpipe_protocol::messages::{
    FileChunk, FileDialogResponse, FileInfo, FileTransferStart, Message, OpenFileDialog,
    RequestChunk, RequestParallelChunks, RequestStreamingFallback, SaveChunk, SaveCommit,
    SaveDone, SaveStart, StartStreaming, TransferFault,
};
use splatpipe_transfer::tiers::{
    AUTO_STREAM_MAX, DEFAULT_CHUNK_SIZE, DIRECT_LOAD_THRESHOLD, fallback_chunk_size,
};
use splatpipe_transfer::{ChunkSequencer, SaveSession, chunk_count, descriptor};

use crate::HostError;
use crate::dialog::{DestinationPicker, FileDialog};
use crate::registry::SessionRegistry;

/// Identity of an open document on the host side.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
}

impl Document {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown.ply".into())
    }
}

/// The host side of the pipeline.
///
/// Dispatches every viewer-originated message, serves chunk ranges out of
/// the cached artifact, runs the legacy push-mode stream, and commits
/// uploads. Chunk serving keeps no per-session state: each response is
/// derived from the requested index, so duplicated or reordered requests
/// are harmless.
pub struct HostSurface {
    cache: Arc<PlyCache>,
    registry: SessionRegistry,
    saves: Mutex<HashMap<String, SaveSession>>,
    picker: Arc<dyn DestinationPicker>,
    dialog: Arc<dyn FileDialog>,
    sender: Sender,
}

impl HostSurface {
    pub fn new(
        cache: Arc<PlyCache>,
        picker: Arc<dyn DestinationPicker>,
        dialog: Arc<dyn FileDialog>,
        sender: Sender,
    ) -> Self {
        Self {
            cache,
            registry: SessionRegistry::new(),
            saves: Mutex::new(HashMap::new()),
            picker,
            dialog,
            sender,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Announces an opened document to the viewer.
    ///
    /// Sends `fileInfo` with the artifact's size, and auto-starts
    /// streaming for artifacts in the band above the direct-load
    /// threshold but below [`AUTO_STREAM_MAX`]; anything larger waits
    /// for the viewer's explicit fallback request.
    pub async fn announce(&self, doc: &Document) -> Result<(), HostError> {
        let (artifact, total_size) = self.artifact_for(doc).await?;
        tracing::info!(
            document = %doc.id,
            artifact = %artifact.display(),
            total_size,
            "announcing document"
        );

        self.sender.send(Message::FileInfo(FileInfo {
            file_name: doc.basename(),
            file_size: total_size,
        }))?;

        if total_size > DIRECT_LOAD_THRESHOLD && total_size <= AUTO_STREAM_MAX {
            self.sender.send(Message::StartStreaming(StartStreaming {
                file_size: total_size,
                chunk_size: DEFAULT_CHUNK_SIZE,
                filename: doc.basename(),
            }))?;
        }
        Ok(())
    }

    /// Re-normalizes a changed source and tells the viewer to reload.
    pub async fn notify_source_changed(&self, doc: &Document) -> Result<(), HostError> {
        self.artifact_for(doc).await?;
        self.sender.send(Message::ModelRefresh)?;
        Ok(())
    }

    /// Dispatches one viewer-originated message.
    ///
    /// Per-operation failures are reported to the viewer as
    /// `chunkError`/`fileError` and are never retried here; only channel
    /// loss propagates as `Err`.
    pub async fn handle(&self, doc: &Document, msg: Message) -> Result<(), HostError> {
        match msg {
            Message::RequestStreamingFallback(req) => {
                self.handle_streaming_fallback(doc, req).await
            }
            Message::RequestChunk(req) => {
                if let Err(e) = self.serve_chunk(doc, &req).await {
                    tracing::error!(document = %doc.id, "chunk request failed: {e}");
                    self.send_chunk_error(&e)?;
                }
                Ok(())
            }
            Message::RequestParallelChunks(req) => {
                if let Err(e) = self.serve_batch(doc, &req).await {
                    tracing::error!(document = %doc.id, "parallel chunk request failed: {e}");
                    self.send_chunk_error(&e)?;
                }
                Ok(())
            }
            Message::SaveStart(req) => self.handle_save_start(req).await,
            Message::SaveChunk(req) => self.handle_save_chunk(req).await,
            Message::SaveCommit(req) => self.handle_save_commit(req).await,
            Message::OpenFileDialog(req) => self.handle_open_dialog(req).await,

            // Viewer-bound traffic looped back at us is a wiring mistake;
            // drop it rather than fault the session.
            other @ (Message::FileInfo(_)
            | Message::StartStreaming(_)
            | Message::ChunkResponse(_)
            | Message::ChunkError(_)
            | Message::FileError(_)
            | Message::FileTransferStart(_)
            | Message::FileChunk(_)
            | Message::SaveDone(_)
            | Message::SaveCancelled
            | Message::FileDialogResponse(_)
            | Message::ModelRefresh) => {
                tracing::debug!(document = %doc.id, ?other, "ignoring viewer-bound message");
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------
    // Download direction
    // -----------------------------------------------------------------

    async fn serve_chunk(&self, doc: &Document, req: &RequestChunk) -> Result<(), HostError> {
        let seq = self.sequencer_for(doc, req.chunk_size).await?;
        seq.send_chunk(&self.sender, req.chunk_index).await?;
        Ok(())
    }

    async fn serve_batch(
        &self,
        doc: &Document,
        req: &RequestParallelChunks,
    ) -> Result<(), HostError> {
        let seq = self.sequencer_for(doc, req.chunk_size).await?;
        seq.send_batch(&self.sender, req.start_chunk_index, req.batch_size)
            .await?;
        Ok(())
    }

    /// Runs the legacy push-mode stream for one fallback request.
    ///
    /// The registry rejects a second start for the same document while
    /// one is active; the duplicate request is dropped, matching the
    /// observed behavior the viewer depends on.
    async fn handle_streaming_fallback(
        &self,
        doc: &Document,
        req: RequestStreamingFallback,
    ) -> Result<(), HostError> {
        if let Err(HostError::SessionActive(_)) = self.registry.begin(&doc.id).await {
            tracing::warn!(document = %doc.id, "duplicate streaming request ignored");
            return Ok(());
        }

        let result = self.push_stream(doc, &req).await;
        self.registry.finish(&doc.id).await;

        if let Err(e) = result {
            tracing::error!(document = %doc.id, "streaming fallback failed: {e}");
            self.sender.send(Message::FileError(TransferFault {
                request_id: req.request_id.clone(),
                error: e.to_string(),
            }))?;
        }
        Ok(())
    }

    async fn push_stream(
        &self,
        doc: &Document,
        req: &RequestStreamingFallback,
    ) -> Result<(), HostError> {
        let (artifact, total_size) = self.artifact_for(doc).await?;
        let chunk_size = req
            .chunk_size
            .filter(|&s| s > 0)
            .unwrap_or_else(|| fallback_chunk_size(total_size));
        let total_chunks = chunk_count(total_size, chunk_size);
        let request_id = if req.request_id.is_empty() {
            format!("streaming-fallback-{}", uuid::Uuid::new_v4())
        } else {
            req.request_id.clone()
        };

        tracing::info!(
            document = %doc.id,
            total_size,
            chunk_size,
            total_chunks,
            "starting push-mode stream"
        );
        self.sender
            .send(Message::FileTransferStart(FileTransferStart {
                request_id: request_id.clone(),
                filename: doc.basename(),
                total_size,
                total_chunks,
                chunk_size,
            }))?;

        let seq = ChunkSequencer::new(&artifact, total_size, chunk_size);
        for index in 0..total_chunks {
            let Some(desc) = descriptor(total_size, chunk_size, index) else {
                break;
            };
            let data = seq.read_range(&desc).await?;
            self.sender.send(Message::FileChunk(FileChunk {
                request_id: request_id.clone(),
                chunk_index: index,
                total_chunks,
                data: STANDARD.encode(&data),
                chunk_size: desc.length,
                is_last_chunk: desc.is_last,
            }))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Save direction
    // -----------------------------------------------------------------

    async fn handle_save_start(&self, req: SaveStart) -> Result<(), HostError> {
        let target = match self.pick_target(&req.filename).await {
            Ok(target) => target,
            Err(HostError::DialogCancelled) => {
                tracing::info!(request = %req.request_id, "save cancelled at picker");
                self.sender.send(Message::SaveCancelled)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let session = SaveSession::new(
            req.request_id.clone(),
            req.filename.clone(),
            req.total_size,
            req.total_chunks,
            &target,
        );
        tracing::info!(
            request = %req.request_id,
            filename = %req.filename,
            total_size = req.total_size,
            total_chunks = req.total_chunks,
            target = %target.display(),
            "save session created"
        );
        self.saves.lock().await.insert(req.request_id, session);
        Ok(())
    }

    async fn handle_save_chunk(&self, req: SaveChunk) -> Result<(), HostError> {
        let mut saves = self.saves.lock().await;
        let Some(session) = saves.get_mut(&req.request_id) else {
            drop(saves);
            tracing::warn!(request = %req.request_id, "chunk for unknown save session");
            return self.send_file_error(&req.request_id, "save session not found");
        };
        if let Err(e) = session.store_chunk(req.index, req.bytes) {
            drop(saves);
            return self.send_file_error(&req.request_id, &e.to_string());
        }
        Ok(())
    }

    async fn handle_save_commit(&self, req: SaveCommit) -> Result<(), HostError> {
        let Some(mut session) = self.saves.lock().await.remove(&req.request_id) else {
            tracing::warn!(request = %req.request_id, "commit for unknown save session");
            return self.send_file_error(&req.request_id, "save session not found");
        };
        if let Some(path) = &req.target_path {
            session.set_target(PathBuf::from(path));
        }

        match session.commit(req.byte_length).await {
            Ok(location) => {
                self.sender.send(Message::SaveDone(SaveDone {
                    request_id: req.request_id,
                    location: location.display().to_string(),
                }))?;
                Ok(())
            }
            Err(e) => {
                tracing::error!(request = %req.request_id, "save commit failed: {e}");
                self.send_file_error(&req.request_id, &e.to_string())
            }
        }
    }

    async fn handle_open_dialog(&self, req: OpenFileDialog) -> Result<(), HostError> {
        let files = self.dialog.pick_files(&req.options).await;
        tracing::debug!(request = %req.request_id, count = files.len(), "file dialog answered");
        self.sender
            .send(Message::FileDialogResponse(FileDialogResponse {
                request_id: req.request_id,
                success: true,
                files,
                error: String::new(),
            }))?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Shared plumbing
    // -----------------------------------------------------------------

    async fn pick_target(&self, filename: &str) -> Result<PathBuf, HostError> {
        self.picker
            .pick_destination(filename)
            .await
            .ok_or(HostError::DialogCancelled)
    }

    async fn artifact_for(&self, doc: &Document) -> Result<(PathBuf, u64), HostError> {
        let artifact = self.cache.ensure(&doc.path).await?;
        let total_size = tokio::fs::metadata(&artifact).await?.len();
        Ok((artifact, total_size))
    }

    async fn sequencer_for(
        &self,
        doc: &Document,
        chunk_size: u64,
    ) -> Result<ChunkSequencer, HostError> {
        let (artifact, total_size) = self.artifact_for(doc).await?;
        let chunk_size = if chunk_size > 0 {
            chunk_size
        } else {
            DEFAULT_CHUNK_SIZE
        };
        Ok(ChunkSequencer::new(&artifact, total_size, chunk_size))
    }

    fn send_chunk_error(&self, error: &HostError) -> Result<(), HostError> {
        self.sender.send(Message::ChunkError(TransferFault {
            request_id: String::new(),
            error: error.to_string(),
        }))?;
        Ok(())
    }

    fn send_file_error(&self, request_id: &str, error: &str) -> Result<(), HostError> {
        self.sender.send(Message::FileError(TransferFault {
            request_id: request_id.to_string(),
            error: error.to_string(),
        }))?;
        Ok(())
    }
}
