use std::time::Instant;

use ahash::AHashMap;
use bytes::Bytes;
use thiserror::Error;

use super::field::FieldValue;
use crate::protocol::Protocol;

/// A parsed, typed representation of one protocol message.
#[derive(Debug, Clone)]
pub struct Frame {
    pub protocol: Protocol,
    pub fields: AHashMap<String, FieldValue>,
    pub raw: Bytes,
    pub timestamp: Instant,
}

impl Frame {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }
}

/// Returned by [`super::Dissector::dissect`] on input that cannot be parsed
/// into a [`Frame`]. Never a panic, even on arbitrary/malformed bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DissectError {
    #[error("frame is empty")]
    Empty,
    #[error("malformed frame: {0}")]
    Malformed(String),
}
