//! Converts recovered protocol messages into typed [`Frame`]s, derives a
//! session id for each, and scans their fields for sensitive data.

mod field;
mod frame;
mod grpc;
mod http;
mod json;
mod sensitive;
mod session_id;
mod websocket;

pub use field::FieldValue;
pub use frame::{DissectError, Frame};
pub use grpc::GrpcDissector;
pub use http::HttpDissector;
pub use json::JsonDissector;
pub use sensitive::{looks_like_jwt, mask_value};
pub use session_id::{Endpoints, SessionIdOutcome};
pub use websocket::WebSocketDissector;

pub(crate) use sensitive::candidate_secret_values;
pub(crate) use session_id::session_cookie_value;

use crate::finding::Finding;
use crate::protocol::Protocol;

/// External context a [`Dissector`] may need to derive a session id when
/// the frame itself carries no stable marker of its own.
#[derive(Debug, Clone, Default)]
pub struct SessionContext<'a> {
    pub endpoints: Option<&'a Endpoints>,
    pub connection_id: Option<&'a str>,
}

/// One protocol's frame parser, session-id deriver and sensitive-data
/// scanner. Implementations never panic on malformed or truncated input;
/// [`Dissector::dissect`] reports that via [`DissectError`].
pub trait Dissector: Send + Sync {
    /// Cheap check of whether `bytes` looks like this protocol, and how
    /// confident that guess is (0.0 to 1.0).
    fn identify(&self, bytes: &[u8]) -> (bool, f64);

    fn dissect(&self, bytes: &[u8]) -> Result<Frame, DissectError>;

    fn session_id(&self, frame: &Frame, ctx: &SessionContext) -> SessionIdOutcome;

    fn find_sensitive(&self, frame: &Frame) -> Vec<Finding>;
}

/// Returns the built-in dissector for a protocol tag.
pub fn for_protocol(protocol: Protocol) -> Box<dyn Dissector> {
    match protocol {
        Protocol::Http => Box::new(HttpDissector::new()),
        Protocol::WebSocket => Box::new(WebSocketDissector::new()),
        Protocol::Grpc => Box::new(GrpcDissector::new()),
        Protocol::Json => Box::new(JsonDissector::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_protocol_returns_a_dissector_that_rejects_empty_input_cleanly() {
        for protocol in [Protocol::Http, Protocol::WebSocket, Protocol::Grpc, Protocol::Json] {
            let dissector = for_protocol(protocol);
            dissector.identify(b"");
            assert!(matches!(dissector.dissect(b""), Err(DissectError::Empty)));
        }
    }
}
