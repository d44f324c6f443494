/// Heuristic raw-byte scan
///
/// Some producers embed JSON values that the chunk walker does not expose cleanly
/// (compressed or oddly framed chunks). This pass ignores chunk boundaries entirely and
/// searches the raw buffer for a literal key. It is kept separate from the chunk walker
/// so each can be tested on its own.

/// Chunk tags that terminate a `parameters` value
const VALUE_TERMINATORS: [&[u8]; 2] = [b"IDAT", b"IEND"];

/// Bytes of chunk framing (CRC + next length) between a value and the next tag
const FRAMING_LEN: usize = 8;

/// Find `key` and return the first balanced JSON object that follows it.
///
/// The span must parse as JSON; otherwise nothing is returned.
pub fn json_after_key(buffer: &[u8], key: &str) -> Option<String> {
    let key_pos = find(buffer, key.as_bytes(), 0)?;
    let search_from = key_pos + key.len();
    let start = search_from + buffer[search_from..].iter().position(|&b| b == b'{')?;
    let end = balanced_object_end(buffer, start)?;
    let span = &buffer[start..end];

    serde_json::from_slice::<serde::de::IgnoredAny>(span).ok()?;
    Some(String::from_utf8_lossy(span).into_owned())
}

/// Find `key`, skip to the value after the next null byte, and cut it at the
/// following `IDAT`/`IEND` tag (these values are not reliably null terminated).
pub fn terminated_value(buffer: &[u8], key: &str) -> Option<String> {
    let key_pos = find(buffer, key.as_bytes(), 0)?;
    let search_from = key_pos + key.len();
    let value_start = search_from + buffer[search_from..].iter().position(|&b| b == 0)? + 1;

    let marker = VALUE_TERMINATORS
        .iter()
        .filter_map(|tag| find(buffer, tag, value_start))
        .min();

    let value_end = match marker {
        // Drop the CRC and length bytes that precede the next tag
        Some(pos) if pos >= value_start + FRAMING_LEN => pos - FRAMING_LEN,
        Some(pos) => pos,
        None => buffer.len(),
    };

    let value = String::from_utf8_lossy(&buffer[value_start..value_end]);
    let value = value.trim_end_matches('\0').trim_end();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

/// Exclusive end of the object opened at `start`. Braces inside string literals
/// do not count.
fn balanced_object_end(buffer: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in buffer[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}
