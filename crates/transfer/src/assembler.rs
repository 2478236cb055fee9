use splatpipe_protocol::types::{DeliveryMode, SessionState};

use crate::TransferError;
use crate::chunk::chunk_count;
use crate::tiers::{PARALLEL_THRESHOLD, VALIDATION_SKIP_THRESHOLD, batch_width};

/// What the viewer should do after feeding a chunk to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Pull the next chunk sequentially.
    RequestChunk(u32),
    /// Pull the next batch of chunks.
    RequestBatch { start: u32, width: u32 },
    /// Every expected chunk is accounted for; assemble now.
    AssembleNow,
    /// More chunks from the current batch are still in flight.
    Wait,
}

/// Viewer-side download session: an index-keyed slot array plus the
/// request-scheduling state machine around it.
///
/// Chunks are stored wherever their index says, so any arrival order
/// produces the same assembly. Duplicate indices overwrite without double
/// counting. Batch windows complete by received count, not index order.
pub struct TransferSession {
    id: String,
    filename: String,
    total_size: u64,
    chunk_size: u64,
    expected_chunks: u32,
    mode: DeliveryMode,
    batch_size: u32,
    batches_requested: u32,
    slots: Vec<Option<Vec<u8>>>,
    received_count: u32,
    state: SessionState,
}

impl TransferSession {
    /// Allocates a session for an artifact of `total_size` bytes.
    ///
    /// Payloads above [`PARALLEL_THRESHOLD`] use parallel-batched
    /// delivery with a size-tiered batch width; smaller ones pull
    /// sequentially.
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
    ) -> Self {
        let expected_chunks = chunk_count(total_size, chunk_size);
        let (mode, batch_size) = if total_size > PARALLEL_THRESHOLD {
            (DeliveryMode::ParallelBatched, batch_width(total_size))
        } else {
            (DeliveryMode::Sequential, 0)
        };
        Self {
            id: id.into(),
            filename: filename.into(),
            total_size,
            chunk_size,
            expected_chunks,
            mode,
            batch_size,
            batches_requested: 0,
            slots: vec![None; expected_chunks as usize],
            received_count: 0,
            state: SessionState::Idle,
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

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn expected_chunks(&self) -> u32 {
        self.expected_chunks
    }

    pub fn received_count(&self) -> u32 {
        self.received_count
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Starts the session and returns the first request to issue.
    pub fn begin(&mut self) -> NextAction {
        self.state = SessionState::Streaming;
        if self.expected_chunks == 0 {
            return NextAction::AssembleNow;
        }
        match self.mode {
            DeliveryMode::Sequential => NextAction::RequestChunk(0),
            DeliveryMode::ParallelBatched => self.next_batch(),
        }
    }

    /// Stores one received chunk and decides the next request.
    ///
    /// An empty payload flagged as last is the sequencer's answer to a
    /// request past the end; it stores nothing and just signals assembly.
    pub fn store_chunk(
        &mut self,
        index: u32,
        bytes: Vec<u8>,
        is_last: bool,
    ) -> Result<NextAction, TransferError> {
        if self.state != SessionState::Streaming {
            tracing::debug!(index, state = ?self.state, "chunk ignored outside streaming state");
            return Ok(NextAction::Wait);
        }
        if index >= self.expected_chunks {
            return Err(TransferError::ChunkOutOfRange {
                index,
                expected: self.expected_chunks,
            });
        }

        if !bytes.is_empty() {
            let slot = &mut self.slots[index as usize];
            if slot.is_none() {
                self.received_count += 1;
            }
            *slot = Some(bytes);
        }

        if self.received_count == self.expected_chunks {
            return Ok(NextAction::AssembleNow);
        }

        match self.mode {
            DeliveryMode::Sequential => {
                if is_last {
                    // The sender says the artifact is over; whatever is
                    // missing will surface as MissingChunk in assembly.
                    Ok(NextAction::AssembleNow)
                } else {
                    Ok(NextAction::RequestChunk(index + 1))
                }
            }
            DeliveryMode::ParallelBatched => {
                let window_end = (self.batches_requested * self.batch_size).min(self.expected_chunks);
                if self.received_count >= window_end {
                    Ok(self.next_batch())
                } else {
                    Ok(NextAction::Wait)
                }
            }
        }
    }

    /// Marks the session failed (channel error, timeout, abort message).
    pub fn fail(&mut self) {
        self.state = SessionState::Failed;
    }

    /// Verifies and concatenates the slots into the final byte sequence.
    ///
    /// Fails with `MissingChunk` if any slot is empty and with
    /// `FormatValidationFailure` if the leading bytes are not a PLY
    /// signature. The signature check is skipped above
    /// [`VALIDATION_SKIP_THRESHOLD`].
    pub fn assemble(&mut self) -> Result<Vec<u8>, TransferError> {
        self.state = SessionState::Assembling;

        for (i, slot) in self.slots.iter().enumerate() {
            if slot.as_ref().is_none_or(|s| s.is_empty()) {
                self.state = SessionState::Failed;
                return Err(TransferError::MissingChunk(i as u32));
            }
        }

        let mut data = Vec::with_capacity(self.total_size as usize);
        for slot in &self.slots {
            data.extend_from_slice(slot.as_deref().unwrap_or_default());
        }

        if self.total_size <= VALIDATION_SKIP_THRESHOLD && !splatpipe_ply::looks_like_ply(&data) {
            self.state = SessionState::Failed;
            return Err(TransferError::FormatValidationFailure);
        }

        self.state = SessionState::Complete;
        tracing::info!(
            id = %self.id,
            bytes = data.len(),
            chunks = self.expected_chunks,
            "assembly complete"
        );
        Ok(data)
    }

    fn next_batch(&mut self) -> NextAction {
        let start = self.batches_requested * self.batch_size;
        if start >= self.expected_chunks {
            return NextAction::Wait;
        }
        let width = self.batch_size.min(self.expected_chunks - start);
        self.batches_requested += 1;
        NextAction::RequestBatch { start, width }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::MIB;

    const PLY_BODY: &[u8] = b"ply\nformat binary_little_endian 1.0\nelement vertex 0\nend_header\n";

    /// Splits a PLY-signed payload into `chunk_size` pieces.
    fn split(payload: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        payload.chunks(chunk_size).map(<[u8]>::to_vec).collect()
    }

    fn sequential_session(payload: &[u8], chunk_size: usize) -> TransferSession {
        TransferSession::new("t1", "scan.ply", payload.len() as u64, chunk_size as u64)
    }

    #[test]
    fn sequential_session_walks_indices_in_order() {
        let chunks = split(PLY_BODY, 16);
        let mut session = sequential_session(PLY_BODY, 16);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.begin(), NextAction::RequestChunk(0));
        assert_eq!(session.state(), SessionState::Streaming);

        for (i, chunk) in chunks.iter().enumerate() {
            let last = i == chunks.len() - 1;
            let action = session.store_chunk(i as u32, chunk.clone(), last).unwrap();
            if last {
                assert_eq!(action, NextAction::AssembleNow);
            } else {
                assert_eq!(action, NextAction::RequestChunk(i as u32 + 1));
            }
        }
        assert_eq!(session.assemble().unwrap(), PLY_BODY);
        assert_eq!(session.state(), SessionState::Complete);
    }

    #[test]
    fn reassembly_is_order_independent() {
        let chunks = split(PLY_BODY, 8);
        let n = chunks.len();

        // In order.
        let mut ordered = sequential_session(PLY_BODY, 8);
        ordered.begin();
        for (i, c) in chunks.iter().enumerate() {
            ordered.store_chunk(i as u32, c.clone(), i == n - 1).unwrap();
        }
        let ordered_bytes = ordered.assemble().unwrap();

        // Reversed, then rotated: two distinct permutations.
        for permutation in [
            (0..n).rev().collect::<Vec<_>>(),
            (0..n).map(|i| (i + n / 2) % n).collect::<Vec<_>>(),
        ] {
            let mut shuffled = sequential_session(PLY_BODY, 8);
            shuffled.begin();
            for &i in &permutation {
                shuffled
                    .store_chunk(i as u32, chunks[i].clone(), i == n - 1)
                    .unwrap();
            }
            assert_eq!(shuffled.assemble().unwrap(), ordered_bytes);
        }
    }

    #[test]
    fn duplicate_chunk_overwrites_without_double_count() {
        let chunks = split(PLY_BODY, 16);
        let mut session = sequential_session(PLY_BODY, 16);
        session.begin();
        session.store_chunk(0, chunks[0].clone(), false).unwrap();
        session.store_chunk(0, chunks[0].clone(), false).unwrap();
        assert_eq!(session.received_count(), 1);
    }

    #[test]
    fn missing_slot_fails_assembly_with_no_partial_result() {
        let chunks = split(PLY_BODY, 16);
        let mut session = sequential_session(PLY_BODY, 16);
        session.begin();
        // Skip chunk 1 entirely; sender claims the stream is done.
        session.store_chunk(0, chunks[0].clone(), false).unwrap();
        let action = session
            .store_chunk(chunks.len() as u32 - 1, chunks.last().unwrap().clone(), true)
            .unwrap();
        assert_eq!(action, NextAction::AssembleNow);

        let err = session.assemble().unwrap_err();
        assert!(matches!(err, TransferError::MissingChunk(1)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn bad_signature_fails_validation() {
        let payload = b"definitely not a point cloud";
        let mut session = sequential_session(payload, 8);
        session.begin();
        let chunks = split(payload, 8);
        let n = chunks.len();
        for (i, c) in chunks.into_iter().enumerate() {
            session.store_chunk(i as u32, c, i == n - 1).unwrap();
        }
        let err = session.assemble().unwrap_err();
        assert!(matches!(err, TransferError::FormatValidationFailure));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut session = sequential_session(PLY_BODY, 16);
        session.begin();
        let err = session.store_chunk(1000, vec![1], false).unwrap_err();
        assert!(matches!(
            err,
            TransferError::ChunkOutOfRange { index: 1000, .. }
        ));
    }

    #[test]
    fn large_payload_selects_parallel_batched_mode() {
        let total = 800 * MIB;
        let session = TransferSession::new("t2", "big.ply", total, 8 * MIB);
        assert_eq!(session.mode(), DeliveryMode::ParallelBatched);
        assert_eq!(session.expected_chunks(), 100);
    }

    #[test]
    fn batch_window_completes_by_received_count_not_order() {
        // 800 MiB / 8 MiB = 100 chunks, batch width 16.
        let total = 800 * MIB;
        let mut session = TransferSession::new("t3", "big.ply", total, 8 * MIB);
        let first = session.begin();
        assert_eq!(first, NextAction::RequestBatch { start: 0, width: 16 });

        // Feed the first window in reverse: nothing new is requested
        // until the window is full, regardless of index order.
        for i in (1..16u32).rev() {
            let action = session.store_chunk(i, vec![0u8; 8], false).unwrap();
            assert_eq!(action, NextAction::Wait, "chunk {i}");
        }
        let action = session.store_chunk(0, vec![0u8; 8], false).unwrap();
        assert_eq!(action, NextAction::RequestBatch { start: 16, width: 16 });
    }

    #[test]
    fn final_batch_is_truncated_to_expected_chunks() {
        // 100 chunks with width 16: the last window is 96..100.
        let total = 800 * MIB;
        let mut session = TransferSession::new("t4", "big.ply", total, 8 * MIB);
        session.begin();
        let mut fed = 0u32;
        let mut last_batch = None;
        while fed < 96 {
            match session.store_chunk(fed, vec![0u8; 8], false).unwrap() {
                NextAction::RequestBatch { start, width } => {
                    last_batch = Some((start, width));
                    assert!(start + width <= 100);
                }
                NextAction::Wait => {}
                other => panic!("unexpected: {other:?}"),
            }
            fed += 1;
        }
        assert_eq!(last_batch, Some((96, 4)));
    }

    #[test]
    fn empty_terminal_chunk_signals_without_storing() {
        let chunks = split(PLY_BODY, 16);
        let n = chunks.len();
        let mut session = sequential_session(PLY_BODY, 16);
        session.begin();
        for (i, c) in chunks.into_iter().enumerate() {
            session.store_chunk(i as u32, c, i == n - 1).unwrap();
        }
        assert_eq!(session.received_count(), n as u32);
    }
}
