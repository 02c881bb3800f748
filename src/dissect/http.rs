use std::time::Instant;

use ahash::AHashMap;
use bytes::Bytes;

use super::field::FieldValue;
use super::frame::{DissectError, Frame};
use super::session_id::{derive_http_session_id, derive_websocket_handshake_session_id, SessionIdOutcome};
use super::sensitive::find_sensitive;
use super::{Dissector, SessionContext};
use crate::finding::Finding;
use crate::protocol::Protocol;

#[derive(Default)]
pub struct HttpDissector;

impl HttpDissector {
    pub fn new() -> Self {
        Self
    }
}

impl Dissector for HttpDissector {
    fn identify(&self, bytes: &[u8]) -> (bool, f64) {
        let looks_like_request = bytes.starts_with(b"GET ")
            || bytes.starts_with(b"POST ")
            || bytes.starts_with(b"PUT ")
            || bytes.starts_with(b"DELETE ")
            || bytes.starts_with(b"PATCH ")
            || bytes.starts_with(b"HEAD ")
            || bytes.starts_with(b"OPTIONS ");
        let looks_like_response = bytes.starts_with(b"HTTP/");
        (looks_like_request || looks_like_response, if looks_like_request || looks_like_response { 0.95 } else { 0.0 })
    }

    fn dissect(&self, bytes: &[u8]) -> Result<Frame, DissectError> {
        if bytes.is_empty() {
            return Err(DissectError::Empty);
        }

        let header_end = find_subslice(bytes, b"\r\n\r\n")
            .map(|i| i + 4)
            .ok_or_else(|| DissectError::Malformed("no header terminator found".to_string()))?;

        let mut fields = AHashMap::new();
        let mut lines = bytes[..header_end].split(|&b| b == b'\n').map(strip_cr);
        let first_line = lines.next().ok_or_else(|| DissectError::Malformed("missing start line".to_string()))?;
        parse_start_line(first_line, &mut fields)?;

        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some(colon) = line.iter().position(|&b| b == b':') {
                let name = String::from_utf8_lossy(&line[..colon]).to_ascii_lowercase();
                let value = String::from_utf8_lossy(trim_ascii(&line[colon + 1..])).to_string();
                fields.insert(name, FieldValue::Str(value));
            }
        }

        let body = &bytes[header_end.min(bytes.len())..];
        if !body.is_empty() {
            fields.insert("body".to_string(), FieldValue::Bytes(Bytes::copy_from_slice(body)));
        }

        Ok(Frame { protocol: Protocol::Http, fields, raw: Bytes::copy_from_slice(bytes), timestamp: Instant::now() })
    }

    fn session_id(&self, frame: &Frame, ctx: &SessionContext) -> SessionIdOutcome {
        if frame.field_str("sec-websocket-key").is_some() {
            derive_websocket_handshake_session_id(frame, ctx.endpoints)
        } else {
            derive_http_session_id(frame, ctx.endpoints)
        }
    }

    fn find_sensitive(&self, frame: &Frame) -> Vec<Finding> {
        find_sensitive(frame)
    }
}

fn parse_start_line(line: &[u8], fields: &mut AHashMap<String, FieldValue>) -> Result<(), DissectError> {
    let text = std::str::from_utf8(line).map_err(|_| DissectError::Malformed("start line is not utf-8".to_string()))?;
    let mut tokens = text.split_whitespace();
    let first = tokens.next().ok_or_else(|| DissectError::Malformed("empty start line".to_string()))?;

    if first.starts_with("HTTP/") {
        let status = tokens.next().ok_or_else(|| DissectError::Malformed("missing status code".to_string()))?;
        let reason = tokens.collect::<Vec<_>>().join(" ");
        fields.insert("http_version".to_string(), FieldValue::Str(first.to_string()));
        fields.insert("status".to_string(), FieldValue::Str(status.to_string()));
        fields.insert("reason".to_string(), FieldValue::Str(reason));
    } else {
        let target = tokens.next().unwrap_or("");
        let version = tokens.next().unwrap_or("");
        fields.insert("method".to_string(), FieldValue::Str(first.to_string()));
        match target.split_once('?') {
            Some((path, query)) => {
                fields.insert("path".to_string(), FieldValue::Str(path.to_string()));
                fields.insert("query".to_string(), FieldValue::Str(query.to_string()));
            }
            None => {
                fields.insert("path".to_string(), FieldValue::Str(target.to_string()));
            }
        }
        fields.insert("http_version".to_string(), FieldValue::Str(version.to_string()));
    }
    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}
