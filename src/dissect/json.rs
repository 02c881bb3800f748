use std::time::Instant;

use ahash::AHashMap;
use bytes::Bytes;
use serde_json::Value;

use super::field::FieldValue;
use super::frame::{DissectError, Frame};
use super::sensitive::find_sensitive;
use super::session_id::SessionIdOutcome;
use super::{Dissector, SessionContext};
use crate::finding::Finding;
use crate::protocol::Protocol;

#[derive(Default)]
pub struct JsonDissector;

impl JsonDissector {
    pub fn new() -> Self {
        Self
    }
}

impl Dissector for JsonDissector {
    fn identify(&self, bytes: &[u8]) -> (bool, f64) {
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        let looks_like_json = matches!(first, Some(b'{') | Some(b'['));
        (looks_like_json, if looks_like_json { 0.6 } else { 0.0 })
    }

    fn dissect(&self, bytes: &[u8]) -> Result<Frame, DissectError> {
        if bytes.is_empty() {
            return Err(DissectError::Empty);
        }
        let value: Value = serde_json::from_slice(bytes).map_err(|e| DissectError::Malformed(e.to_string()))?;
        let fields = match value_to_field(value) {
            FieldValue::Map(map) => map,
            // A bare scalar or array still needs to be reachable; wrap it
            // under a single synthetic key rather than discarding it.
            other => {
                let mut map = AHashMap::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Ok(Frame { protocol: Protocol::Json, fields, raw: Bytes::copy_from_slice(bytes), timestamp: Instant::now() })
    }

    fn session_id(&self, _frame: &Frame, _ctx: &SessionContext) -> SessionIdOutcome {
        // Bare JSON payloads carry no inherent connection or cookie
        // concept; the enclosing transport (HTTP, WebSocket) is where a
        // session marker would live. This always defers to the caller.
        SessionIdOutcome::NeedsConnectionContext
    }

    fn find_sensitive(&self, frame: &Frame) -> Vec<Finding> {
        find_sensitive(frame)
    }
}

fn value_to_field(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Str(String::new()),
        Value::Bool(b) => FieldValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Int(i)
            } else {
                FieldValue::Str(n.to_string())
            }
        }
        Value::String(s) => FieldValue::Str(s),
        Value::Array(items) => {
            let mut map = AHashMap::new();
            for (i, item) in items.into_iter().enumerate() {
                map.insert(i.to_string(), value_to_field(item));
            }
            FieldValue::Map(map)
        }
        Value::Object(obj) => {
            let mut map = AHashMap::new();
            for (k, v) in obj {
                map.insert(k, value_to_field(v));
            }
            FieldValue::Map(map)
        }
    }
}
