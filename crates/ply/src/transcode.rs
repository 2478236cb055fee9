use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::header::{PlyHeader, PropertyType};
use crate::{PlyError, PlyEncoding};

/// Read granularity for the ASCII record stream.
const READ_CHUNK: usize = 64 * 1024;

/// Rewrites an ASCII-encoded PLY as binary little-endian.
///
/// Streams `input` forward in bounded reads, carrying any partial trailing
/// record across read boundaries; a record never has to align with a read
/// chunk. Stops after exactly `header.vertex_count` records even if data
/// remains. A stream that ends early is tolerated: the records that exist
/// are written and a warning is logged.
///
/// Returns the number of records written.
pub fn transcode<R: Read, W: Write>(
    mut input: R,
    header: &PlyHeader,
    mut output: W,
) -> Result<u64, PlyError> {
    write_binary_header(header, &mut output)?;

    // Skip the ASCII header exactly; its byte length is known.
    let skipped = io::copy(
        &mut input.by_ref().take(header.header_end_offset),
        &mut io::sink(),
    )?;
    if skipped < header.header_end_offset {
        tracing::warn!(
            expected = header.vertex_count,
            written = 0u64,
            "source ended inside its own header"
        );
        return Ok(0);
    }

    let mut carry: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut written = 0u64;

    'stream: loop {
        let n = input.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        carry.extend_from_slice(&chunk[..n]);

        // Consume complete lines; the tail stays in the carry buffer.
        let mut start = 0;
        while let Some(nl) = carry[start..].iter().position(|&b| b == b'\n') {
            let line = &carry[start..start + nl];
            start += nl + 1;
            if write_record(line, header, &mut output)? {
                written += 1;
                if written == header.vertex_count {
                    break 'stream;
                }
            }
        }
        carry.drain(..start);
    }

    // A final record without a trailing newline.
    if written < header.vertex_count
        && write_record(&carry, header, &mut output)?
    {
        written += 1;
    }

    if written < header.vertex_count {
        tracing::warn!(
            expected = header.vertex_count,
            written,
            "source stream ended before the declared record count"
        );
    }

    output.flush()?;
    Ok(written)
}

/// Transcodes `src` into a new file at `dest`. The source is never touched.
pub fn transcode_file(src: &Path, header: &PlyHeader, dest: &Path) -> Result<u64, PlyError> {
    let input = BufReader::new(File::open(src)?);
    let mut output = BufWriter::new(File::create(dest)?);
    let written = transcode(input, header, &mut output)?;
    output.flush()?;
    Ok(written)
}

fn write_binary_header<W: Write>(header: &PlyHeader, output: &mut W) -> Result<(), PlyError> {
    let mut text = String::new();
    text.push_str("ply\n");
    text.push_str("format ");
    text.push_str(PlyEncoding::BinaryLittleEndian.keyword());
    text.push_str(" 1.0\n");
    text.push_str(&format!("element vertex {}\n", header.vertex_count));
    for prop in &header.properties {
        text.push_str(&format!("property {} {}\n", prop.ty.keyword(), prop.name));
    }
    text.push_str("end_header\n");
    output.write_all(text.as_bytes())?;
    Ok(())
}

/// Converts one ASCII record line. Returns `false` for blank lines.
fn write_record<W: Write>(
    line: &[u8],
    header: &PlyHeader,
    output: &mut W,
) -> Result<bool, PlyError> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(false);
    }

    let mut values = trimmed.split_whitespace();
    for prop in &header.properties {
        let value: f64 = values
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);
        match prop.ty {
            PropertyType::Float | PropertyType::Other(_) => {
                output.write_all(&(value as f32).to_le_bytes())?;
            }
            PropertyType::Double => {
                output.write_all(&value.to_le_bytes())?;
            }
            PropertyType::UChar => {
                output.write_all(&[value.round().clamp(0.0, 255.0) as u8])?;
            }
            PropertyType::Int => {
                output.write_all(&(value.round() as i32).to_le_bytes())?;
            }
            PropertyType::UInt => {
                output.write_all(&(value.round().max(0.0) as u32).to_le_bytes())?;
            }
        }
    }
    Ok(true)
}
