/// Strict PNG chunk walker
///
/// Reads the container chunk by chunk: 4-byte big-endian length, 4-byte type tag,
/// `length` bytes of data, 4-byte CRC (skipped, never verified). Only `IHDR` and the
/// three text chunk types are decoded. Anything past a truncated chunk is ignored.

use serde::Serialize;
use tracing::debug;

/// The fixed 8-byte PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Geometry and pixel format from the `IHDR` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PngHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
}

/// Everything the strict walk recovered, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkWalk {
    pub header: Option<PngHeader>,
    /// Key/value pairs from tEXt, iTXt and zTXt chunks (duplicates kept)
    pub text: Vec<(String, String)>,
}

/// Walk all chunks after the signature.
///
/// The caller is responsible for checking the signature; this function starts at
/// byte 8 unconditionally.
pub fn walk_chunks(buffer: &[u8]) -> ChunkWalk {
    let mut walk = ChunkWalk::default();
    let mut pos = PNG_SIGNATURE.len();

    while let Some(length) = read_u32(buffer, pos) {
        let Some(tag) = buffer.get(pos + 4..pos + 8) else {
            break;
        };
        let data_start = pos + 8;
        let data_end = match data_start.checked_add(length as usize) {
            Some(end) if end <= buffer.len() => end,
            _ => {
                debug!(
                    "Truncated {} chunk at offset {}",
                    String::from_utf8_lossy(tag),
                    pos
                );
                break;
            }
        };
        let data = &buffer[data_start..data_end];

        match tag {
            b"IHDR" => walk.header = parse_header(data),
            b"tEXt" | b"iTXt" | b"zTXt" => {
                if let Some(pair) = decode_text_chunk(tag, data) {
                    walk.text.push(pair);
                }
            }
            b"IEND" => break,
            _ => {}
        }

        // Skip the CRC
        pos = data_end + 4;
    }

    walk
}

fn read_u32(buffer: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = buffer.get(at..at.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn parse_header(data: &[u8]) -> Option<PngHeader> {
    Some(PngHeader {
        width: read_u32(data, 0)?,
        height: read_u32(data, 4)?,
        bit_depth: *data.get(8)?,
        color_type: *data.get(9)?,
    })
}

/// Split a text chunk into key and value.
///
/// Chunks without a null separator are malformed and dropped.
fn decode_text_chunk(tag: &[u8], data: &[u8]) -> Option<(String, String)> {
    let key_end = data.iter().position(|&b| b == 0)?;
    let key = String::from_utf8_lossy(&data[..key_end]).into_owned();
    let rest = &data[key_end + 1..];

    let value = match tag {
        b"tEXt" => String::from_utf8_lossy(rest).into_owned(),
        b"iTXt" => decode_itxt_value(rest)?,
        // Compressed payloads are not inflated
        _ => compressed_placeholder(rest.len().saturating_sub(1)),
    };

    Some((key, value))
}

/// iTXt layout after the key: compression flag, compression method,
/// language tag (null terminated), translated keyword (null terminated), text.
fn decode_itxt_value(rest: &[u8]) -> Option<String> {
    let compressed = *rest.first()? == 1;
    let after_flags = rest.get(2..)?;
    let language_end = after_flags.iter().position(|&b| b == 0)?;
    let after_language = &after_flags[language_end + 1..];
    let translated_end = after_language.iter().position(|&b| b == 0)?;
    let text = &after_language[translated_end + 1..];

    if compressed {
        Some(compressed_placeholder(text.len()))
    } else {
        Some(String::from_utf8_lossy(text).into_owned())
    }
}

fn compressed_placeholder(len: usize) -> String {
    format!("[Compressed data: {} bytes]", len)
}
