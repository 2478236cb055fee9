//! Best-effort extraction of a PLY payload embedded in a container.
//!
//! Some save paths can only produce an archive wrapping the real
//! interchange payload. This module carves the payload out by byte-pattern
//! search. Hard assumption: the payload begins with the binary PLY
//! signature and its header ends with the standard terminator. This is a
//! bounded fallback, not a container parser; when the patterns are not
//! found the caller writes the raw container instead.

use std::ops::Range;

use splatpipe_ply::{BINARY_SIGNATURE, HEADER_TERMINATOR};

/// ZIP local-entry magic probe.
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.len() >= 4
        && bytes[0] == 0x50
        && bytes[1] == 0x4B
        && (bytes[2] == 0x03 || bytes[2] == 0x04)
}

/// Locates an embedded binary PLY inside `container`.
///
/// The payload runs from the PLY signature to the next ZIP entry marker
/// (`PK`) found at least 1 KiB past the header terminator, or to the end
/// of the container if no marker follows.
pub fn carve_ply(container: &[u8]) -> Option<Range<usize>> {
    let start = find(container, BINARY_SIGNATURE)?;
    let term = find(&container[start..], HEADER_TERMINATOR)?;
    let header_end = start + term + HEADER_TERMINATOR.len();

    let search_from = header_end + 1000;
    let end = if search_from < container.len() {
        find(&container[search_from..], b"PK")
            .map(|rel| search_from + rel)
            .unwrap_or(container.len())
    } else {
        container.len()
    };

    Some(start..end)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_container(payload_tail: usize, with_trailing_entry: bool) -> (Vec<u8>, Vec<u8>) {
        let mut ply = Vec::new();
        ply.extend_from_slice(b"ply\nformat binary_little_endian 1.0\n");
        ply.extend_from_slice(b"element vertex 100\nproperty float x\nend_header\n");
        ply.extend((0..payload_tail).map(|i| (i % 241) as u8));

        let mut container = Vec::new();
        container.extend_from_slice(b"PK\x03\x04fake-local-entry-header");
        container.extend_from_slice(&ply);
        if with_trailing_entry {
            container.extend_from_slice(b"PK\x01\x02fake-central-directory");
        }
        (container, ply)
    }

    #[test]
    fn zip_probe() {
        assert!(is_zip(b"PK\x03\x04rest"));
        assert!(is_zip(b"PK\x04\x06rest"));
        assert!(!is_zip(b"ply\nformat"));
        assert!(!is_zip(b"PK"));
    }

    #[test]
    fn carves_payload_up_to_next_entry() {
        let (container, ply) = fake_container(4096, true);
        let range = carve_ply(&container).unwrap();
        assert_eq!(&container[range], &ply[..]);
    }

    #[test]
    fn carves_to_container_end_without_trailing_entry() {
        let (container, ply) = fake_container(4096, false);
        let range = carve_ply(&container).unwrap();
        assert_eq!(&container[range], &ply[..]);
    }

    #[test]
    fn short_payload_keeps_bytes_inside_guard_window() {
        // A PK pair closer than 1 KiB past the header must not truncate
        // the payload.
        let (container, _) = fake_container(100, true);
        let range = carve_ply(&container).unwrap();
        assert_eq!(range.end, container.len());
    }

    #[test]
    fn missing_signature_returns_none() {
        assert!(carve_ply(b"PK\x03\x04no point cloud in here").is_none());
    }

    #[test]
    fn missing_terminator_returns_none() {
        let mut container = b"PK\x03\x04".to_vec();
        container.extend_from_slice(b"ply\nformat binary_little_endian 1.0\ntruncated");
        assert!(carve_ply(&container).is_none());
    }
}
