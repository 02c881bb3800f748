use sha2::{Digest, Sha256};

use super::frame::Frame;

const SESSION_COOKIES: [&str; 5] = ["JSESSIONID", "PHPSESSID", "session_id", "sid", "sessionid"];

/// Network 4-tuple a caller may supply when no protocol-level session
/// marker (cookie, bearer token) is available.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
}

impl Endpoints {
    fn as_session_id(&self) -> String {
        format!("{}:{}\u{2192}{}:{}", self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}

/// Result of a session-id derivation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdOutcome {
    Id(String),
    /// The protocol's own frame carries nothing stable enough; the caller
    /// (connection layer) must supply external context.
    NeedsConnectionContext,
}

fn sha256_hex_prefix(input: &str, n_bytes: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest[..n_bytes].iter().map(|b| format!("{b:02x}")).collect()
}

/// Parses a `Cookie:` or `Set-Cookie:`-style header value into `name=value`
/// pairs and returns the first one whose name matches a known session
/// cookie.
fn find_session_cookie(cookie_header: &str) -> Option<(&str, &str)> {
    cookie_header.split(';').filter_map(|pair| pair.trim().split_once('=')).find(|(name, _)| {
        SESSION_COOKIES.iter().any(|known| known.eq_ignore_ascii_case(name))
    })
}

/// Owned value of the first known session cookie in `cookie_header`, for
/// callers outside this module (the vulnerability-scanner layer compares
/// this value across frames) that don't need the cookie's name.
pub(crate) fn session_cookie_value(cookie_header: &str) -> Option<String> {
    find_session_cookie(cookie_header).map(|(_, value)| value.to_string())
}

pub fn derive_http_session_id(frame: &Frame, endpoints: Option<&Endpoints>) -> SessionIdOutcome {
    if let Some(cookie) = frame.field_str("cookie").and_then(find_session_cookie) {
        return SessionIdOutcome::Id(format!("http_cookie_{}", cookie.1));
    }
    if let Some(set_cookie) = frame.field_str("set-cookie").and_then(find_session_cookie) {
        return SessionIdOutcome::Id(format!("http_cookie_{}", set_cookie.1));
    }
    if let Some(auth) = frame.field_str("authorization") {
        return SessionIdOutcome::Id(format!("http_basic_{}", sha256_hex_prefix(auth, 8)));
    }
    match endpoints {
        Some(ep) => SessionIdOutcome::Id(ep.as_session_id()),
        None => SessionIdOutcome::NeedsConnectionContext,
    }
}

pub fn derive_websocket_handshake_session_id(frame: &Frame, endpoints: Option<&Endpoints>) -> SessionIdOutcome {
    if let Some(key) = frame.field_str("sec-websocket-key") {
        return SessionIdOutcome::Id(format!("ws_key_{key}"));
    }
    if let Some(cookie) = frame.field_str("cookie").and_then(find_session_cookie) {
        return SessionIdOutcome::Id(format!("http_cookie_{}", cookie.1));
    }
    if let Some(auth) = frame.field_str("authorization") {
        return SessionIdOutcome::Id(format!("ws_auth_{}", sha256_hex_prefix(auth, 8)));
    }
    match endpoints {
        Some(ep) => SessionIdOutcome::Id(ep.as_session_id()),
        None => SessionIdOutcome::NeedsConnectionContext,
    }
}

/// WebSocket data frames carry no session marker of their own; the
/// connection layer that demultiplexes frames to TCP connections is the
/// only place that id can come from.
pub fn derive_websocket_data_session_id(connection_id: Option<&str>) -> SessionIdOutcome {
    match connection_id {
        Some(id) => SessionIdOutcome::Id(id.to_string()),
        None => SessionIdOutcome::NeedsConnectionContext,
    }
}

pub fn derive_grpc_session_id(frame: &Frame) -> SessionIdOutcome {
    let stream_id = frame.fields.get("stream_id").and_then(|v| match v {
        super::field::FieldValue::Int(n) => Some(*n),
        _ => None,
    });
    let stream_id = stream_id.unwrap_or(0);

    if let Some(auth) = frame.field_str(":authorization") {
        return SessionIdOutcome::Id(format!("grpc_auth_{}_stream_{}", sha256_hex_prefix(auth, 4), stream_id));
    }
    if let Some(session) = frame.field_str("x-session-id") {
        return SessionIdOutcome::Id(format!("grpc_session_{session}_stream_{stream_id}"));
    }
    if let Some(path) = frame.field_str(":path") {
        return SessionIdOutcome::Id(format!("grpc_path_{}_stream_{}", sha256_hex_prefix(path, 4), stream_id));
    }
    SessionIdOutcome::Id(format!("grpc_stream_{stream_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dissect::field::FieldValue;
    use crate::protocol::Protocol;
    use ahash::AHashMap;
    use std::time::Instant;

    fn frame_with(fields: &[(&str, &str)]) -> Frame {
        let mut map = AHashMap::new();
        for (k, v) in fields {
            map.insert(k.to_string(), FieldValue::Str(v.to_string()));
        }
        Frame { protocol: Protocol::Http, fields: map, raw: bytes::Bytes::new(), timestamp: Instant::now() }
    }

    #[test]
    fn authorization_header_drives_the_bearer_token_scenario_exactly() {
        let frame = frame_with(&[("authorization", "Bearer eyJh.eyJh.sig")]);
        let outcome = derive_http_session_id(&frame, None);
        assert_eq!(outcome, SessionIdOutcome::Id(format!("http_basic_{}", sha256_hex_prefix("Bearer eyJh.eyJh.sig", 8))));
    }

    #[test]
    fn known_session_cookie_wins_over_endpoints() {
        let frame = frame_with(&[("cookie", "JSESSIONID=ABC; other=1")]);
        let endpoints = Endpoints { src_ip: "1.1.1.1".into(), src_port: 1, dst_ip: "2.2.2.2".into(), dst_port: 2 };
        assert_eq!(derive_http_session_id(&frame, Some(&endpoints)), SessionIdOutcome::Id("http_cookie_ABC".to_string()));
    }

    #[test]
    fn falls_back_to_endpoints_when_nothing_else_present() {
        let frame = frame_with(&[]);
        let endpoints = Endpoints { src_ip: "10.0.0.1".into(), src_port: 4000, dst_ip: "10.0.0.2".into(), dst_port: 80 };
        assert_eq!(
            derive_http_session_id(&frame, Some(&endpoints)),
            SessionIdOutcome::Id("10.0.0.1:4000\u{2192}10.0.0.2:80".to_string())
        );
    }

    #[test]
    fn needs_connection_context_when_nothing_is_available() {
        let frame = frame_with(&[]);
        assert_eq!(derive_http_session_id(&frame, None), SessionIdOutcome::NeedsConnectionContext);
    }

    #[test]
    fn websocket_handshake_prefers_the_sec_websocket_key() {
        let frame = frame_with(&[("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")]);
        assert_eq!(
            derive_websocket_handshake_session_id(&frame, None),
            SessionIdOutcome::Id("ws_key_dGhlIHNhbXBsZSBub25jZQ==".to_string())
        );
    }
}
