use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::{HEADER_CEILING, PlyError};

/// Declared encoding of a PLY file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyEncoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl PlyEncoding {
    /// The keyword as it appears on the `format` line.
    pub fn keyword(&self) -> &'static str {
        match self {
            PlyEncoding::Ascii => "ascii",
            PlyEncoding::BinaryLittleEndian => "binary_little_endian",
            PlyEncoding::BinaryBigEndian => "binary_big_endian",
        }
    }
}

/// Scalar type of a vertex property.
///
/// Types outside the known set are carried through by name and treated as
/// 4-byte numerics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Float,
    Double,
    UChar,
    Int,
    UInt,
    Other(String),
}

impl PropertyType {
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "float" => PropertyType::Float,
            "double" => PropertyType::Double,
            "uchar" => PropertyType::UChar,
            "int" => PropertyType::Int,
            "uint" => PropertyType::UInt,
            other => PropertyType::Other(other.to_string()),
        }
    }

    pub fn keyword(&self) -> &str {
        match self {
            PropertyType::Float => "float",
            PropertyType::Double => "double",
            PropertyType::UChar => "uchar",
            PropertyType::Int => "int",
            PropertyType::UInt => "uint",
            PropertyType::Other(name) => name,
        }
    }

    /// Fixed width of this type in the binary encoding.
    pub fn size_bytes(&self) -> usize {
        match self {
            PropertyType::Float => 4,
            PropertyType::Double => 8,
            PropertyType::UChar => 1,
            PropertyType::Int => 4,
            PropertyType::UInt => 4,
            PropertyType::Other(_) => 4,
        }
    }
}

/// One declared vertex property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyProperty {
    pub name: String,
    pub ty: PropertyType,
}

impl PlyProperty {
    pub fn size_bytes(&self) -> usize {
        self.ty.size_bytes()
    }
}

/// Parsed PLY header. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    pub encoding: PlyEncoding,
    pub vertex_count: u64,
    pub properties: Vec<PlyProperty>,
    /// Exact byte count consumed by the header, terminator included.
    pub header_end_offset: u64,
}

impl PlyHeader {
    /// Fixed width of one binary record.
    pub fn record_size(&self) -> usize {
        self.properties.iter().map(PlyProperty::size_bytes).sum()
    }
}

/// Reads forward until the header terminator and parses the schema.
///
/// Pure read: consumes only header bytes plus at most one read buffer of
/// lookahead from `reader`. Fails with `MalformedHeader` if no terminator
/// appears within [`HEADER_CEILING`] bytes, and `UnsupportedFormat` if the
/// `format` line names an encoding outside the known three.
pub fn inspect<R: Read>(mut reader: R) -> Result<PlyHeader, PlyError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let terminator_at = loop {
        if let Some(pos) = find(&buf, b"end_header") {
            // Keep reading until the newline that closes the terminator
            // line is in the buffer, so the byte offset is exact.
            if let Some(nl) = buf[pos..].iter().position(|&b| b == b'\n') {
                break pos + nl + 1;
            }
        }
        if buf.len() > HEADER_CEILING {
            return Err(PlyError::MalformedHeader(format!(
                "no end_header within {HEADER_CEILING} bytes"
            )));
        }
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Err(PlyError::MalformedHeader(
                "stream ended before end_header".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let header = parse_lines(&buf[..terminator_at])?;
    Ok(PlyHeader {
        header_end_offset: terminator_at as u64,
        ..header
    })
}

/// Opens `path` and inspects its header.
pub fn inspect_file(path: &Path) -> Result<PlyHeader, PlyError> {
    let file = File::open(path)?;
    inspect(BufReader::new(file))
}

fn parse_lines(header_bytes: &[u8]) -> Result<PlyHeader, PlyError> {
    let text = String::from_utf8_lossy(header_bytes);
    let mut lines = text.lines();

    match lines.next().map(str::trim) {
        Some("ply") => {}
        _ => {
            return Err(PlyError::MalformedHeader(
                "missing ply magic line".into(),
            ));
        }
    }

    let mut encoding = None;
    let mut vertex_count = 0u64;
    let mut properties = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();
        match parts.next() {
            Some("format") => {
                let keyword = parts.next().unwrap_or("");
                encoding = Some(match keyword {
                    "ascii" => PlyEncoding::Ascii,
                    "binary_little_endian" => PlyEncoding::BinaryLittleEndian,
                    "binary_big_endian" => PlyEncoding::BinaryBigEndian,
                    other => {
                        return Err(PlyError::UnsupportedFormat(other.to_string()));
                    }
                });
            }
            Some("element") => {
                if parts.next() == Some("vertex") {
                    let count = parts.next().unwrap_or("");
                    vertex_count = count.parse().map_err(|_| {
                        PlyError::MalformedHeader(format!("bad vertex count: {count}"))
                    })?;
                }
            }
            Some("property") => {
                let (Some(ty), Some(name)) = (parts.next(), parts.next()) else {
                    continue;
                };
                properties.push(PlyProperty {
                    name: name.to_string(),
                    ty: PropertyType::from_keyword(ty),
                });
            }
            _ => {}
        }
    }

    let Some(encoding) = encoding else {
        return Err(PlyError::MalformedHeader("missing format line".into()));
    };

    Ok(PlyHeader {
        encoding,
        vertex_count,
        properties,
        header_end_offset: 0,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII_HEADER: &str = "ply\n\
        format ascii 1.0\n\
        comment made by hand\n\
        element vertex 3\n\
        property float x\n\
        property float y\n\
        property float z\n\
        property uchar red\n\
        end_header\n";

    #[test]
    fn parses_ascii_header() {
        let header = inspect(ASCII_HEADER.as_bytes()).unwrap();
        assert_eq!(header.encoding, PlyEncoding::Ascii);
        assert_eq!(header.vertex_count, 3);
        assert_eq!(header.properties.len(), 4);
        assert_eq!(header.properties[0].name, "x");
        assert_eq!(header.properties[3].ty, PropertyType::UChar);
        assert_eq!(header.record_size(), 13);
    }

    #[test]
    fn header_end_offset_is_byte_exact() {
        let header = inspect(ASCII_HEADER.as_bytes()).unwrap();
        assert_eq!(header.header_end_offset, ASCII_HEADER.len() as u64);

        // Body bytes after the terminator must not be counted.
        let with_body = format!("{ASCII_HEADER}0 0 0 255\n1 1 1 255\n");
        let header = inspect(with_body.as_bytes()).unwrap();
        assert_eq!(header.header_end_offset, ASCII_HEADER.len() as u64);
    }

    #[test]
    fn terminator_split_across_read_boundary() {
        // A comment long enough to push end_header past the first 4 KiB read.
        let padding = "comment ".to_string() + &"x".repeat(5000) + "\n";
        let text = format!(
            "ply\nformat binary_little_endian 1.0\n{padding}element vertex 7\nproperty float x\nend_header\n"
        );
        let header = inspect(text.as_bytes()).unwrap();
        assert_eq!(header.encoding, PlyEncoding::BinaryLittleEndian);
        assert_eq!(header.vertex_count, 7);
        assert_eq!(header.header_end_offset, text.len() as u64);
    }

    #[test]
    fn crlf_terminator_counts_both_bytes() {
        let text = "ply\r\nformat ascii 1.0\r\nelement vertex 1\r\nproperty float x\r\nend_header\r\n";
        let header = inspect(text.as_bytes()).unwrap();
        assert_eq!(header.header_end_offset, text.len() as u64);
        assert_eq!(header.vertex_count, 1);
    }

    #[test]
    fn missing_terminator_hits_ceiling() {
        let endless = format!("ply\nformat ascii 1.0\n{}", "comment spam\n".repeat(4000));
        let err = inspect(endless.as_bytes()).unwrap_err();
        assert!(matches!(err, PlyError::MalformedHeader(_)));
    }

    #[test]
    fn truncated_stream_is_malformed() {
        let err = inspect("ply\nformat ascii 1.0\nelement ver".as_bytes()).unwrap_err();
        assert!(matches!(err, PlyError::MalformedHeader(_)));
    }

    #[test]
    fn missing_magic_is_malformed() {
        let err = inspect("pyl\nformat ascii 1.0\nend_header\n".as_bytes()).unwrap_err();
        assert!(matches!(err, PlyError::MalformedHeader(_)));
    }

    #[test]
    fn unknown_format_is_unsupported() {
        let text = "ply\nformat binary_middle_endian 1.0\nend_header\n";
        let err = inspect(text.as_bytes()).unwrap_err();
        assert!(matches!(err, PlyError::UnsupportedFormat(name) if name == "binary_middle_endian"));
    }

    #[test]
    fn missing_format_line_is_malformed() {
        let text = "ply\nelement vertex 2\nproperty float x\nend_header\n";
        let err = inspect(text.as_bytes()).unwrap_err();
        assert!(matches!(err, PlyError::MalformedHeader(_)));
    }

    #[test]
    fn unknown_property_type_defaults_to_four_bytes() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty half nx\nend_header\n";
        let header = inspect(text.as_bytes()).unwrap();
        assert_eq!(header.properties[0].ty, PropertyType::Other("half".into()));
        assert_eq!(header.record_size(), 4);
    }
}
