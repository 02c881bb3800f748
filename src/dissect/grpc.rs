use std::time::Instant;

use ahash::AHashMap;
use bytes::Bytes;

use super::field::FieldValue;
use super::frame::{DissectError, Frame};
use super::session_id::{derive_grpc_session_id, SessionIdOutcome};
use super::sensitive::find_sensitive;
use super::{Dissector, SessionContext};
use crate::detect::grpc::{decode_frame_header, Http2FrameType};
use crate::finding::Finding;
use crate::protocol::Protocol;

const FRAME_HEADER_LEN: usize = 9;

#[derive(Default)]
pub struct GrpcDissector;

impl GrpcDissector {
    pub fn new() -> Self {
        Self
    }
}

impl Dissector for GrpcDissector {
    fn identify(&self, bytes: &[u8]) -> (bool, f64) {
        (bytes.len() >= FRAME_HEADER_LEN, if bytes.len() >= FRAME_HEADER_LEN { 0.5 } else { 0.0 })
    }

    fn dissect(&self, bytes: &[u8]) -> Result<Frame, DissectError> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(DissectError::Empty);
        }
        let (length, frame_type, stream_id) = decode_frame_header(bytes);
        let payload = &bytes[FRAME_HEADER_LEN..];
        if payload.len() < length {
            return Err(DissectError::Malformed("payload shorter than declared length".to_string()));
        }
        let payload = &payload[..length];

        let mut fields = AHashMap::new();
        fields.insert("frame_type".to_string(), FieldValue::Str(frame_type.as_str().to_string()));
        fields.insert("stream_id".to_string(), FieldValue::Int(stream_id as i64));
        fields.insert("flags".to_string(), FieldValue::Int(bytes[4] as i64));

        if frame_type == Http2FrameType::Headers {
            for (name, value) in decode_literal_headers(payload) {
                fields.insert(name, FieldValue::Str(value));
            }
        } else if frame_type == Http2FrameType::Data && !payload.is_empty() {
            fields.insert("compressed".to_string(), FieldValue::Bool(payload[0] != 0));
        }

        Ok(Frame { protocol: Protocol::Grpc, fields, raw: Bytes::copy_from_slice(bytes), timestamp: Instant::now() })
    }

    fn session_id(&self, frame: &Frame, _ctx: &SessionContext) -> SessionIdOutcome {
        derive_grpc_session_id(frame)
    }

    fn find_sensitive(&self, frame: &Frame) -> Vec<Finding> {
        find_sensitive(frame)
    }
}

/// Best-effort HPACK header-block walker. Only literal header fields with
/// a new (non-indexed) name and a non-Huffman-coded value are resolved to
/// a `(name, value)` pair; indexed fields and dynamic-table-size updates
/// are skipped (their length is still consumed correctly so later entries
/// stay aligned); Huffman-coded values are skipped unresolved. A full
/// HPACK implementation, including the static/dynamic tables and Huffman
/// decoding, is out of proportion to this component and not attested
/// anywhere nearby in this codebase.
fn decode_literal_headers(data: &[u8]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let first = data[pos];
        if first & 0x80 != 0 {
            // Indexed header field: 7-bit prefix index, no further bytes.
            let (_, consumed) = decode_int(first, 7, &data[pos + 1..]);
            pos += 1 + consumed;
        } else if first & 0x40 != 0 {
            pos += decode_literal_field(data, pos, 6, &mut out);
        } else if first & 0x20 != 0 {
            // Dynamic table size update: 5-bit prefix integer, no value.
            let (_, consumed) = decode_int(first, 5, &data[pos + 1..]);
            pos += 1 + consumed;
        } else {
            // Literal without indexing (0000) or never indexed (0001):
            // both use a 4-bit name-index prefix.
            pos += decode_literal_field(data, pos, 4, &mut out);
        }
    }
    out
}

fn decode_literal_field(data: &[u8], start: usize, prefix_bits: u8, out: &mut Vec<(String, String)>) -> usize {
    let first = data[start];
    let (name_index, mut consumed) = decode_int(first, prefix_bits, &data[start + 1..]);
    consumed += 1;

    let name = if name_index == 0 {
        match decode_string(&data[start + consumed..]) {
            Some((text, str_len)) => {
                consumed += str_len;
                Some(text)
            }
            None => return data.len() - start,
        }
    } else {
        None // indexed name; not resolvable without the static/dynamic table.
    };

    let value = match decode_string(&data[start + consumed..]) {
        Some((text, str_len)) => {
            consumed += str_len;
            Some(text)
        }
        None => return data.len() - start,
    };

    if let (Some(name), Some(value)) = (name, value) {
        out.push((name, value));
    }
    consumed
}

/// RFC 7541 §5.1 integer decoding. `prefix_bits` is the number of bits
/// available in `first_byte`'s low bits; `rest` starts right after it.
fn decode_int(first_byte: u8, prefix_bits: u8, rest: &[u8]) -> (u64, usize) {
    let mask = (1u16 << prefix_bits) as u64 - 1;
    let prefix = (first_byte as u64) & mask;
    if prefix < mask {
        return (prefix, 0);
    }
    let mut value = prefix;
    let mut shift = 0u32;
    let mut consumed = 0usize;
    for &b in rest {
        consumed += 1;
        value += ((b & 0x7F) as u64) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            break;
        }
    }
    (value, consumed)
}

/// Decodes one RFC 7541 §5.2 string literal. Returns `None` (rather than
/// panicking) if the declared length runs past the end of `data`. Returns
/// a placeholder for Huffman-coded strings, since no Huffman table is
/// implemented.
fn decode_string(data: &[u8]) -> Option<(String, usize)> {
    let first = *data.first()?;
    let huffman = first & 0x80 != 0;
    let (len, int_consumed) = decode_int(first, 7, data.get(1..)?);
    let header_len = 1 + int_consumed;
    let len = len as usize;
    if data.len() < header_len + len {
        return None;
    }
    let total = header_len + len;
    if huffman {
        Some(("<huffman-encoded>".to_string(), total))
    } else {
        let text = String::from_utf8_lossy(&data[header_len..total]).to_string();
        Some((text, total))
    }
}
