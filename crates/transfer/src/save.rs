use std::path::{Path, PathBuf};

use crate::TransferError;
use crate::extract::{carve_ply, is_zip};

/// Host-side upload session for the save/export direction.
///
/// The viewer slices an outgoing payload into fixed-size chunks; this
/// session accumulates them at their declared indices (any order,
/// duplicates overwrite) and writes the destination once, atomically, at
/// commit time. Destroyed after a successful commit or an unrecoverable
/// error.
pub struct SaveSession {
    id: String,
    filename: String,
    total_size: u64,
    total_chunks: u32,
    received_chunks: u32,
    parts: Vec<Option<Vec<u8>>>,
    target: PathBuf,
}

impl SaveSession {
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        total_size: u64,
        total_chunks: u32,
        target: &Path,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            total_size,
            total_chunks,
            received_chunks: 0,
            parts: vec![None; total_chunks as usize],
            target: target.to_path_buf(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn received_chunks(&self) -> u32 {
        self.received_chunks
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Redirects the destination, for commits that name an explicit path.
    pub fn set_target(&mut self, target: PathBuf) {
        self.target = target;
    }

    /// Stores one uploaded chunk at its index.
    pub fn store_chunk(&mut self, index: u32, bytes: Vec<u8>) -> Result<(), TransferError> {
        if index >= self.total_chunks {
            return Err(TransferError::ChunkOutOfRange {
                index,
                expected: self.total_chunks,
            });
        }
        let slot = &mut self.parts[index as usize];
        if slot.is_none() {
            self.received_chunks += 1;
        }
        *slot = Some(bytes);
        Ok(())
    }

    /// Verifies the session and writes the destination.
    ///
    /// Every chunk must be present and the concatenation must measure
    /// exactly `byte_length`; any verification failure is
    /// `IncompleteUpload` and leaves the destination untouched. ZIP
    /// containers get the PLY payload carved out when the signatures can
    /// be located, and are written raw (with a warning) when they cannot.
    /// The write itself is temp-file-plus-rename.
    pub async fn commit(self, byte_length: u64) -> Result<PathBuf, TransferError> {
        if self.received_chunks != self.total_chunks {
            return Err(TransferError::IncompleteUpload(format!(
                "{}/{} chunks received",
                self.received_chunks, self.total_chunks
            )));
        }

        let mut merged = Vec::with_capacity(byte_length as usize);
        for part in &self.parts {
            merged.extend_from_slice(part.as_deref().unwrap_or_default());
        }
        if merged.len() as u64 != byte_length {
            return Err(TransferError::IncompleteUpload(format!(
                "assembled {} bytes but commit declared {}",
                merged.len(),
                byte_length
            )));
        }

        let payload: &[u8] = if is_zip(&merged) {
            match carve_ply(&merged) {
                Some(range) => {
                    tracing::info!(
                        id = %self.id,
                        carved = range.len(),
                        container = merged.len(),
                        "extracted embedded point-cloud payload from container"
                    );
                    &merged[range]
                }
                None => {
                    tracing::warn!(
                        id = %self.id,
                        "payload signatures not found in container; writing raw container"
                    );
                    &merged
                }
            }
        } else {
            &merged
        };

        if let Some(parent) = self.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::WriteFailure(e.to_string()))?;
        }
        let tmp = self.target.with_extension("part");
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| TransferError::WriteFailure(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.target)
            .await
            .map_err(|e| TransferError::WriteFailure(e.to_string()))?;

        tracing::info!(
            id = %self.id,
            bytes = payload.len(),
            target = %self.target.display(),
            "save committed"
        );
        Ok(self.target)
    }
}
