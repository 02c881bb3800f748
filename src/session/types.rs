use std::time::Instant;

use ahash::AHashMap;

use crate::dissect::{Endpoints, FieldValue, Frame};
use crate::finding::Finding;
use crate::protocol::Protocol;

/// Why a [`Session`] transitioned to terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// A protocol-specific end condition fired.
    ProtocolEnd,
    /// The janitor found `now - last_active > idle_timeout`.
    IdleTimeout,
    /// `SessionManager::complete` was called directly.
    Forced,
}

/// Ordered collection of frames sharing a derived session identifier.
///
/// Frames are owned by the session (arena-style) rather than referenced by
/// pointer; findings refer back to them by position
/// ([`crate::finding::FrameRef`]) so neither side needs to outlive or alias
/// the other.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub protocol: Protocol,
    pub frames: Vec<Frame>,
    pub start: Instant,
    pub last_active: Instant,
    pub state: AHashMap<String, FieldValue>,
    pub endpoints: Option<Endpoints>,
    pub findings: Vec<Finding>,
    terminal: Option<TerminalReason>,
}

impl Session {
    pub fn new(id: impl Into<String>, protocol: Protocol) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            protocol,
            frames: Vec::new(),
            start: now,
            last_active: now,
            state: AHashMap::new(),
            endpoints: None,
            findings: Vec::new(),
            terminal: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        self.terminal
    }

    /// Append `frame`, refresh `last_active`, and evaluate this session's
    /// protocol-specific terminal condition. Returns whether the session
    /// became terminal as a result of this call.
    ///
    /// A no-op once already terminal: no further frames are appended after
    /// termination, enforced here rather than trusted to callers.
    pub fn append(&mut self, frame: Frame) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.last_active = Instant::now();
        self.observe_terminal_markers(&frame);
        self.frames.push(frame);
        if self.protocol_end_reached() {
            self.terminal = Some(TerminalReason::ProtocolEnd);
        }
        self.is_terminal()
    }

    pub fn force_terminal(&mut self) {
        self.terminal.get_or_insert(TerminalReason::Forced);
    }

    pub fn mark_idle_timeout(&mut self) {
        self.terminal.get_or_insert(TerminalReason::IdleTimeout);
    }

    fn observe_terminal_markers(&mut self, frame: &Frame) {
        match self.protocol {
            Protocol::Http => {
                if frame.fields.contains_key("method") {
                    self.state.insert("http_request_seen".to_string(), FieldValue::Bool(true));
                }
                if frame.fields.contains_key("status") {
                    self.state.insert("http_response_seen".to_string(), FieldValue::Bool(true));
                }
            }
            Protocol::Grpc => {
                if let Some(FieldValue::Str(frame_type)) = frame.fields.get("frame_type") {
                    if frame_type == "RST_STREAM" || frame_type == "GOAWAY" {
                        self.state.insert("grpc_stream_ended".to_string(), FieldValue::Bool(true));
                    }
                }
            }
            Protocol::WebSocket | Protocol::Json => {}
        }
    }

    /// HTTP needs one request *and* one response; WebSocket and gRPC end
    /// on a single marker frame; JSON (and anything else) only ever ends
    /// via the janitor's idle timeout.
    fn protocol_end_reached(&self) -> bool {
        match self.protocol {
            Protocol::Http => {
                matches!(self.state.get("http_request_seen"), Some(FieldValue::Bool(true)))
                    && matches!(self.state.get("http_response_seen"), Some(FieldValue::Bool(true)))
            }
            Protocol::WebSocket => self.frames.last().map(is_close_frame).unwrap_or(false),
            Protocol::Grpc => matches!(self.state.get("grpc_stream_ended"), Some(FieldValue::Bool(true))),
            Protocol::Json => false,
        }
    }
}

fn is_close_frame(frame: &Frame) -> bool {
    matches!(frame.fields.get("opcode"), Some(FieldValue::Int(8)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn http_frame(fields: &[(&str, &str)]) -> Frame {
        let mut map = ahash::AHashMap::new();
        for (k, v) in fields {
            map.insert(k.to_string(), FieldValue::Str(v.to_string()));
        }
        Frame { protocol: Protocol::Http, fields: map, raw: Bytes::new(), timestamp: Instant::now() }
    }

    #[test]
    fn http_session_terminates_once_request_and_response_both_seen() {
        let mut session = Session::new("s1", Protocol::Http);
        assert!(!session.append(http_frame(&[("method", "GET")])));
        assert!(session.append(http_frame(&[("status", "200")])));
        assert!(session.is_terminal());
    }

    #[test]
    fn terminal_session_rejects_further_frames() {
        let mut session = Session::new("s1", Protocol::Http);
        session.append(http_frame(&[("method", "GET")]));
        session.append(http_frame(&[("status", "200")]));
        assert_eq!(session.frames.len(), 2);
        session.append(http_frame(&[("method", "GET")]));
        assert_eq!(session.frames.len(), 2, "no frame should be appended after termination");
    }

    #[test]
    fn websocket_session_terminates_on_close_opcode() {
        let mut session = Session::new("s1", Protocol::WebSocket);
        let mut text_fields = ahash::AHashMap::new();
        text_fields.insert("opcode".to_string(), FieldValue::Int(1));
        assert!(!session.append(Frame { protocol: Protocol::WebSocket, fields: text_fields, raw: Bytes::new(), timestamp: Instant::now() }));

        let mut close_fields = ahash::AHashMap::new();
        close_fields.insert("opcode".to_string(), FieldValue::Int(8));
        assert!(session.append(Frame { protocol: Protocol::WebSocket, fields: close_fields, raw: Bytes::new(), timestamp: Instant::now() }));
    }

    #[test]
    fn json_session_never_self_terminates() {
        let mut session = Session::new("s1", Protocol::Json);
        for _ in 0..5 {
            assert!(!session.append(Frame { protocol: Protocol::Json, fields: ahash::AHashMap::new(), raw: Bytes::new(), timestamp: Instant::now() }));
        }
    }
}
