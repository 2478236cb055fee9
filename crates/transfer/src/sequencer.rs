use std::path::{Path, PathBuf};

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use splatpipe_protocol::Sender;
use splatpipe_protocol::messages::{ChunkResponse, Message};

use crate::chunk::{ChunkDescriptor, chunk_count, descriptor};
use crate::tiers::STREAMING_READ_THRESHOLD;
use crate::TransferError;

/// Host-side chunk source for one download session.
///
/// Stateless beyond its parameters: every emission derives from the
/// requested index, so re-requesting an index yields identical bytes and
/// arrival-order races on the channel cannot corrupt a session.
pub struct ChunkSequencer {
    artifact: PathBuf,
    total_size: u64,
    chunk_size: u64,
}

impl ChunkSequencer {
    pub fn new(artifact: &Path, total_size: u64, chunk_size: u64) -> Self {
        Self {
            artifact: artifact.to_path_buf(),
            total_size,
            chunk_size,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn expected_chunks(&self) -> u32 {
        chunk_count(self.total_size, self.chunk_size)
    }

    /// Reads exactly the byte range of `desc`.
    ///
    /// Ranges above [`STREAMING_READ_THRESHOLD`] are read in a forward
    /// loop of bounded reads instead of one oversized read call.
    pub async fn read_range(&self, desc: &ChunkDescriptor) -> Result<Vec<u8>, TransferError> {
        let mut file = File::open(&self.artifact).await?;
        file.seek(SeekFrom::Start(desc.byte_offset)).await?;

        let len = desc.length as usize;
        let mut data = Vec::with_capacity(len);
        if desc.length > STREAMING_READ_THRESHOLD {
            let mut buf = vec![0u8; 8 * 1024 * 1024];
            while data.len() < len {
                let want = buf.len().min(len - data.len());
                let n = file.read(&mut buf[..want]).await?;
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&buf[..n]);
            }
        } else {
            let mut take = file.take(desc.length);
            take.read_to_end(&mut data).await?;
        }
        Ok(data)
    }

    /// Sequential delivery: answers one `requestChunk`.
    ///
    /// A request past the end of the artifact is answered with an empty
    /// terminal chunk rather than an error, so a viewer that overshoots
    /// by one still observes completion.
    pub async fn send_chunk(&self, sender: &Sender, index: u32) -> Result<(), TransferError> {
        let Some(desc) = descriptor(self.total_size, self.chunk_size, index) else {
            sender.send(Message::ChunkResponse(ChunkResponse {
                chunk_index: index,
                data: Vec::new(),
                is_last_chunk: true,
                total_size: self.total_size,
                chunk_size: self.chunk_size,
            }))?;
            return Ok(());
        };

        let data = self.read_range(&desc).await?;
        tracing::debug!(
            index,
            offset = desc.byte_offset,
            len = data.len(),
            "sent chunk"
        );
        sender.send(Message::ChunkResponse(ChunkResponse {
            chunk_index: desc.index,
            data,
            is_last_chunk: desc.is_last,
            total_size: self.total_size,
            chunk_size: self.chunk_size,
        }))?;
        Ok(())
    }

    /// Batched delivery: answers one `requestParallelChunks`.
    ///
    /// All range reads in the batch are issued as concurrently-pending
    /// futures and each chunk message is emitted as its read completes,
    /// removing head-of-line blocking between I/O completions. Indices at
    /// or past the chunk count are simply not issued.
    pub async fn send_batch(
        &self,
        sender: &Sender,
        start_index: u32,
        batch_size: u32,
    ) -> Result<(), TransferError> {
        let mut reads = FuturesUnordered::new();
        for index in start_index..start_index.saturating_add(batch_size) {
            let Some(desc) = descriptor(self.total_size, self.chunk_size, index) else {
                break;
            };
            reads.push(async move {
                let data = self.read_range(&desc).await?;
                Ok::<_, TransferError>((desc, data))
            });
        }

        while let Some(result) = reads.next().await {
            let (desc, data) = result?;
            sender.send(Message::ChunkResponse(ChunkResponse {
                chunk_index: desc.index,
                data,
                is_last_chunk: desc.is_last,
                total_size: self.total_size,
                chunk_size: self.chunk_size,
            }))?;
        }
        tracing::debug!(start_index, batch_size, "batch emitted");
        Ok(())
    }
}
