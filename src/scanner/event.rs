use std::time::Instant;

use ahash::AHashMap;
use bytes::Bytes;

use crate::detect::grpc::{decode_frame_header, Http2FrameType};
use crate::protocol::Protocol;

/// A scalar value attached to a [`ProtocolEvent`]'s metadata map.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

/// One byte-aligned complete message recovered from the ring, tagged by
/// protocol.
#[derive(Debug, Clone)]
pub struct ProtocolEvent {
    pub protocol: Protocol,
    pub frame_type: Option<String>,
    pub bytes: Bytes,
    pub offset: u64,
    pub sequence: u64,
    pub timestamp: Instant,
    pub metadata: AHashMap<String, MetadataValue>,
}

/// Rolling per-protocol counters, maintained per attached stream.
#[derive(Debug, Clone, Default)]
pub struct ProtocolStats {
    pub detected_count: u64,
    pub bytes: u64,
    pub avg_msg_size: f64,
    pub last_detected: Option<Instant>,
}

impl ProtocolStats {
    pub fn record(&mut self, size: u64) {
        self.detected_count += 1;
        self.bytes += size;
        self.avg_msg_size = self.bytes as f64 / self.detected_count as f64;
        self.last_detected = Some(Instant::now());
    }
}

/// Derive `frame_type` and protocol-specific metadata for one recovered
/// message. Never panics: arbitrary, even malformed, `raw` bytes must
/// produce *some* event.
pub fn describe(protocol: Protocol, raw: &[u8]) -> (Option<String>, AHashMap<String, MetadataValue>) {
    let mut metadata = AHashMap::new();
    let frame_type = match protocol {
        Protocol::Http => describe_http(raw, &mut metadata),
        Protocol::WebSocket => describe_websocket(raw, &mut metadata),
        Protocol::Grpc => describe_grpc(raw, &mut metadata),
        Protocol::Json => None,
    };
    (frame_type, metadata)
}

fn describe_http(raw: &[u8], metadata: &mut AHashMap<String, MetadataValue>) -> Option<String> {
    let first_line_end = raw.iter().position(|&b| b == b'\r' || b == b'\n')?;
    let first_line = std::str::from_utf8(&raw[..first_line_end]).ok()?;
    let mut tokens = first_line.split_whitespace();
    let first = tokens.next()?;

    if first.starts_with("HTTP/") {
        // Status line: HTTP/1.1 200 OK
        let status = tokens.next()?;
        metadata.insert("status".to_string(), MetadataValue::Str(status.to_string()));
        Some(status.to_string())
    } else {
        // Request line: METHOD path HTTP/1.1
        if let Some(path) = tokens.next() {
            metadata.insert("path".to_string(), MetadataValue::Str(path.to_string()));
        }
        metadata.insert("method".to_string(), MetadataValue::Str(first.to_string()));
        Some(first.to_string())
    }
}

fn describe_websocket(raw: &[u8], metadata: &mut AHashMap<String, MetadataValue>) -> Option<String> {
    if raw.len() < 2 {
        return None;
    }
    let fin = raw[0] & 0x80 != 0;
    let opcode = raw[0] & 0x0F;
    let masked = raw[1] & 0x80 != 0;
    metadata.insert("fin".to_string(), MetadataValue::Bool(fin));
    metadata.insert("mask".to_string(), MetadataValue::Bool(masked));
    let name = match opcode {
        0x0 => "continuation",
        0x1 => "text",
        0x2 => "binary",
        0x8 => "close",
        0x9 => "ping",
        0xA => "pong",
        _ => "unknown",
    };
    Some(name.to_string())
}

fn describe_grpc(raw: &[u8], metadata: &mut AHashMap<String, MetadataValue>) -> Option<String> {
    if raw.len() < 9 {
        return None;
    }
    let (length, frame_type, stream_id) = decode_frame_header(raw);
    metadata.insert("stream_id".to_string(), MetadataValue::Int(stream_id as i64));
    if frame_type == Http2FrameType::Data && length >= 1 {
        let compressed = raw[9] != 0;
        metadata.insert("compressed".to_string(), MetadataValue::Bool(compressed));
    }
    Some(frame_type.as_str().to_string())
}
