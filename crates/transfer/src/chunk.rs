/// A contiguous byte range of an artifact: the unit of transfer.
///
/// Always derived from `(total_size, chunk_size, index)`, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub byte_offset: u64,
    pub length: u64,
    pub is_last: bool,
}

/// Number of chunks needed to cover `total_size`.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> u32 {
    debug_assert!(chunk_size > 0);
    total_size.div_ceil(chunk_size) as u32
}

/// Descriptor for chunk `index`, or `None` past the end of the artifact.
///
/// Every chunk satisfies `index * chunk_size == byte_offset`; only the
/// final chunk may be shorter than `chunk_size`.
pub fn descriptor(total_size: u64, chunk_size: u64, index: u32) -> Option<ChunkDescriptor> {
    let byte_offset = index as u64 * chunk_size;
    if byte_offset >= total_size {
        return None;
    }
    let length = chunk_size.min(total_size - byte_offset);
    Some(ChunkDescriptor {
        index,
        byte_offset,
        length,
        is_last: byte_offset + length >= total_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_ceiling_division() {
        assert_eq!(chunk_count(0, 10), 0);
        assert_eq!(chunk_count(1, 10), 1);
        assert_eq!(chunk_count(10, 10), 1);
        assert_eq!(chunk_count(11, 10), 2);
        assert_eq!(chunk_count(250 * 1024 * 1024, 10 * 1024 * 1024), 25);
    }

    #[test]
    fn lengths_sum_to_total_with_short_tail_only() {
        for (total, size) in [(100u64, 7u64), (99, 33), (1, 64), (4096, 4096), (4097, 4096)] {
            let count = chunk_count(total, size);
            let mut sum = 0;
            for i in 0..count {
                let d = descriptor(total, size, i).unwrap();
                assert_eq!(d.byte_offset, i as u64 * size);
                if i + 1 < count {
                    assert_eq!(d.length, size);
                    assert!(!d.is_last);
                } else {
                    assert!(d.length <= size);
                    assert!(d.is_last);
                }
                sum += d.length;
            }
            assert_eq!(sum, total, "total {total} size {size}");
        }
    }

    #[test]
    fn descriptor_past_end_is_none() {
        assert!(descriptor(100, 10, 10).is_none());
        assert!(descriptor(100, 10, 9).is_some());
        assert!(descriptor(0, 10, 0).is_none());
    }

    #[test]
    fn exact_multiple_has_full_final_chunk() {
        let d = descriptor(40, 10, 3).unwrap();
        assert_eq!(d.length, 10);
        assert!(d.is_last);
    }
}
