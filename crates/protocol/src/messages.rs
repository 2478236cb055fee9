use serde::{Deserialize, Serialize};

use crate::types::{DialogOptions, FileHandle};

/// Every message that can cross the host-viewer channel.
///
/// Internally tagged on `type`, with the legacy tag spellings preserved on
/// the wire (including the `save/`-prefixed family). Handlers match on this
/// enum exhaustively; adding a variant is a compile error at every dispatch
/// site until it is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // -----------------------------------------------------------------
    // Host -> viewer
    // -----------------------------------------------------------------
    /// Announces the document's name and size after open.
    #[serde(rename = "fileInfo")]
    FileInfo(FileInfo),

    /// Tells the viewer to allocate a download session and start pulling.
    #[serde(rename = "startStreaming")]
    StartStreaming(StartStreaming),

    /// Delivers one chunk of the artifact.
    #[serde(rename = "chunkResponse")]
    ChunkResponse(ChunkResponse),

    /// A chunk read failed; the session must be abandoned.
    #[serde(rename = "chunkError")]
    ChunkError(TransferFault),

    /// A whole-file operation failed; the session must be abandoned.
    #[serde(rename = "fileError")]
    FileError(TransferFault),

    /// Opens a legacy push-mode transfer (host-driven, base64 chunks).
    #[serde(rename = "fileTransferStart")]
    FileTransferStart(FileTransferStart),

    /// One base64-encoded chunk of a legacy push-mode transfer.
    #[serde(rename = "fileChunk")]
    FileChunk(FileChunk),

    /// Acknowledges a committed save with its final location.
    #[serde(rename = "save/done")]
    SaveDone(SaveDone),

    /// The destination picker was dismissed; no save will happen.
    #[serde(rename = "saveCancelled")]
    SaveCancelled,

    /// Result of an [`Message::OpenFileDialog`] request.
    #[serde(rename = "fileDialogResponse")]
    FileDialogResponse(FileDialogResponse),

    /// The source document changed on disk; the viewer should reload.
    #[serde(rename = "modelRefresh")]
    ModelRefresh,

    // -----------------------------------------------------------------
    // Viewer -> host
    // -----------------------------------------------------------------
    /// Asks the host to begin a chunked download session.
    #[serde(rename = "requestStreamingFallback")]
    RequestStreamingFallback(RequestStreamingFallback),

    /// Sequential pull of a single chunk.
    #[serde(rename = "requestChunk")]
    RequestChunk(RequestChunk),

    /// Batched pull of several chunks whose reads may overlap.
    #[serde(rename = "requestParallelChunks")]
    RequestParallelChunks(RequestParallelChunks),

    /// Begins an upload (save/export) session on the host.
    #[serde(rename = "save/start")]
    SaveStart(SaveStart),

    /// One chunk of an upload, keyed by index.
    #[serde(rename = "save/chunk")]
    SaveChunk(SaveChunk),

    /// Finalizes an upload; the host verifies and writes the destination.
    #[serde(rename = "save/commit")]
    SaveCommit(SaveCommit),

    /// Asks the host to show its file picker.
    #[serde(rename = "openFileDialog")]
    OpenFileDialog(OpenFileDialog),
}

// ---------------------------------------------------------------------------
// Host -> viewer payloads
// ---------------------------------------------------------------------------

/// Name and size of the opened document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_name: String,
    pub file_size: u64,
}

/// Parameters of a download session the viewer should allocate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreaming {
    pub file_size: u64,
    pub chunk_size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
}

/// One delivered chunk.
///
/// An empty `data` with `is_last_chunk` set answers a request past the end
/// of the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub chunk_index: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub data: Vec<u8>,
    pub is_last_chunk: bool,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub total_size: u64,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub chunk_size: u64,
}

/// Error detail for `chunkError` / `fileError`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFault {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    pub error: String,
}

/// Header of a legacy push-mode transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferStart {
    pub request_id: String,
    pub filename: String,
    pub total_size: u64,
    pub total_chunks: u32,
    pub chunk_size: u64,
}

/// One chunk of a legacy push-mode transfer.
///
/// `data` stays base64 text end to end; the receiver decodes it, and a
/// malformed string is an `InvalidEncoding` failure there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    pub request_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub data: String,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub chunk_size: u64,
    pub is_last_chunk: bool,
}

/// Acknowledgement of a committed save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDone {
    pub request_id: String,
    pub location: String,
}

/// Files chosen in the host's picker (empty when the user cancelled).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDialogResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileHandle>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

// ---------------------------------------------------------------------------
// Viewer -> host payloads
// ---------------------------------------------------------------------------

/// Request to start a chunked download session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStreamingFallback {
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
}

/// Sequential pull of chunk `chunk_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestChunk {
    pub chunk_index: u32,
    pub chunk_size: u64,
}

/// Batched pull of `batch_size` chunks starting at `start_chunk_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParallelChunks {
    pub start_chunk_index: u32,
    pub batch_size: u32,
    pub chunk_size: u64,
}

/// Begins an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStart {
    pub request_id: String,
    pub filename: String,
    pub total_size: u64,
    pub total_chunks: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
}

/// One uploaded chunk; duplicate indices overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveChunk {
    pub request_id: String,
    pub index: u32,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

/// Finalizes an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCommit {
    pub request_id: String,
    pub byte_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

/// Request for the host's open-file picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFileDialog {
    pub request_id: String,
    #[serde(default)]
    pub options: DialogOptions,
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

/// Serde adapter for binary payloads carried as base64 strings in JSON.
pub mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
