use std::time::Instant;

use ahash::AHashMap;
use bytes::Bytes;

use super::field::FieldValue;
use super::frame::{DissectError, Frame};
use super::session_id::{derive_websocket_data_session_id, SessionIdOutcome};
use super::sensitive::find_sensitive;
use super::{Dissector, SessionContext};
use crate::finding::Finding;
use crate::protocol::Protocol;

#[derive(Default)]
pub struct WebSocketDissector;

impl WebSocketDissector {
    pub fn new() -> Self {
        Self
    }
}

impl Dissector for WebSocketDissector {
    fn identify(&self, bytes: &[u8]) -> (bool, f64) {
        if bytes.len() < 2 {
            return (false, 0.0);
        }
        let opcode = bytes[0] & 0x0F;
        let valid = [0x0, 0x1, 0x2, 0x8, 0x9, 0xA].contains(&opcode);
        (valid, if valid { 0.7 } else { 0.0 })
    }

    fn dissect(&self, bytes: &[u8]) -> Result<Frame, DissectError> {
        if bytes.len() < 2 {
            return Err(DissectError::Empty);
        }

        let fin = bytes[0] & 0x80 != 0;
        let opcode = bytes[0] & 0x0F;
        let masked = bytes[1] & 0x80 != 0;
        let len_field = bytes[1] & 0x7F;

        let (payload_len, mut header_len): (usize, usize) = match len_field {
            0..=125 => (len_field as usize, 2),
            126 => {
                if bytes.len() < 4 {
                    return Err(DissectError::Malformed("truncated 16-bit length".to_string()));
                }
                (u16::from_be_bytes([bytes[2], bytes[3]]) as usize, 4)
            }
            127 => {
                if bytes.len() < 10 {
                    return Err(DissectError::Malformed("truncated 64-bit length".to_string()));
                }
                (u64::from_be_bytes(bytes[2..10].try_into().unwrap()) as usize, 10)
            }
            _ => unreachable!("7-bit field"),
        };

        let mask_key = if masked {
            if bytes.len() < header_len + 4 {
                return Err(DissectError::Malformed("truncated mask key".to_string()));
            }
            let key = [bytes[header_len], bytes[header_len + 1], bytes[header_len + 2], bytes[header_len + 3]];
            header_len += 4;
            Some(key)
        } else {
            None
        };

        if bytes.len() < header_len + payload_len {
            return Err(DissectError::Malformed("truncated payload".to_string()));
        }
        let mut payload = bytes[header_len..header_len + payload_len].to_vec();
        if let Some(key) = mask_key {
            for (i, b) in payload.iter_mut().enumerate() {
                *b ^= key[i % 4];
            }
        }

        let mut fields = AHashMap::new();
        fields.insert("opcode".to_string(), FieldValue::Int(opcode as i64));
        fields.insert("fin".to_string(), FieldValue::Bool(fin));
        fields.insert("mask".to_string(), FieldValue::Bool(masked));
        if let Ok(text) = std::str::from_utf8(&payload) {
            fields.insert("payload".to_string(), FieldValue::Str(text.to_string()));
        } else {
            fields.insert("payload".to_string(), FieldValue::Bytes(Bytes::from(payload)));
        }

        Ok(Frame { protocol: Protocol::WebSocket, fields, raw: Bytes::copy_from_slice(bytes), timestamp: Instant::now() })
    }

    fn session_id(&self, _frame: &Frame, ctx: &SessionContext) -> SessionIdOutcome {
        derive_websocket_data_session_id(ctx.connection_id)
    }

    fn find_sensitive(&self, frame: &Frame) -> Vec<Finding> {
        find_sensitive(frame)
    }
}

pub fn opcode_name(opcode: i64) -> &'static str {
    match opcode {
        0x0 => "continuation",
        0x1 => "text",
        0x2 => "binary",
        0x8 => "close",
        0x9 => "ping",
        0xA => "pong",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmasked_text_frame_decodes_payload_as_utf8() {
        let d = WebSocketDissector::new();
        let frame = d.dissect(&[0x81, 0x05, b'h', b'e', b'l', b'l', b'o']).unwrap();
        assert_eq!(frame.field_str("payload"), Some("hello"));
        assert_eq!(frame.fields.get("opcode"), Some(&FieldValue::Int(1)));
    }

    #[test]
    fn masked_frame_is_unmasked_before_storage() {
        let d = WebSocketDissector::new();
        let mask = [0x01u8, 0x02, 0x03, 0x04];
        let plain = b"hello";
        let masked: Vec<u8> = plain.iter().enumerate().map(|(i, &b)| b ^ mask[i % 4]).collect();
        let mut frame_bytes = vec![0x81, 0x85];
        frame_bytes.extend_from_slice(&mask);
        frame_bytes.extend_from_slice(&masked);
        let frame = d.dissect(&frame_bytes).unwrap();
        assert_eq!(frame.field_str("payload"), Some("hello"));
    }

    #[test]
    fn close_frame_has_zero_length_payload() {
        let d = WebSocketDissector::new();
        let frame = d.dissect(&[0x88, 0x00]).unwrap();
        assert_eq!(frame.fields.get("opcode"), Some(&FieldValue::Int(8)));
    }

    #[test]
    fn data_frame_session_id_requires_connection_context() {
        let d = WebSocketDissector::new();
        let frame = d.dissect(&[0x81, 0x05, b'h', b'e', b'l', b'l', b'o']).unwrap();
        let ctx = SessionContext { endpoints: None, connection_id: None };
        assert_eq!(d.session_id(&frame, &ctx), SessionIdOutcome::NeedsConnectionContext);
    }
}
