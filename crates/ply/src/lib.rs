//! Streaming PLY format inspection and transcoding.
//!
//! Point-cloud interchange files arrive in one of three encodings (ASCII,
//! binary little-endian, binary big-endian). The inspector reads just
//! enough of a file to classify it and extract its schema; the transcoder
//! rewrites an ASCII file into the fixed-width binary little-endian
//! encoding record by record, never holding more than a read buffer and a
//! partial trailing line in memory.

mod header;
mod transcode;

pub use header::{PlyEncoding, PlyHeader, PlyProperty, PropertyType, inspect, inspect_file};
pub use transcode::{transcode, transcode_file};

/// Leading bytes every PLY file starts with.
pub const MAGIC: &[u8] = b"ply";

/// Signature of a binary little-endian PLY, used to validate assembled
/// downloads and to locate a payload embedded in a container.
pub const BINARY_SIGNATURE: &[u8] = b"ply\nformat binary_little_endian";

/// The header terminator, counted into `header_end_offset`.
pub const HEADER_TERMINATOR: &[u8] = b"end_header\n";

/// Headers longer than this are rejected rather than buffered further.
pub const HEADER_CEILING: usize = 32 * 1024;

/// Quick magic check on the leading bytes of an assembled payload.
pub fn looks_like_ply(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

/// Errors from inspection and transcoding.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_matches_signature_prefix() {
        assert!(BINARY_SIGNATURE.starts_with(MAGIC));
        assert!(looks_like_ply(b"ply\nformat ascii 1.0\n"));
        assert!(!looks_like_ply(b"PK\x03\x04"));
        assert!(!looks_like_ply(b"pl"));
    }
}
