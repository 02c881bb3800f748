pub mod grpc;
mod http;
mod json;
mod websocket;

use std::sync::Arc;

use ahash::AHashMap;
use arc_swap::ArcSwapOption;

pub use grpc::GrpcDetector;
pub use http::HttpDetector;
pub use json::JsonDetector;
pub use websocket::WebSocketDetector;

/// Result of asking a detector to look for one complete message at the
/// start of `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectOutcome {
    /// The first `size` bytes of `data` form one complete message.
    Found { size: usize },
    /// `data` may be a message prefix; call again once more bytes arrive.
    NeedMoreData,
    /// `data` cannot be a message of this protocol (bad opcode, broken
    /// frame header, etc). The caller should try another detector or
    /// resynchronise.
    Invalid,
}

/// A stateful per-protocol message-boundary detector.
///
/// Each call to `detect` is given the full set of bytes collected so far
/// for the candidate message (any unmatched tail from a previous scan,
/// plus newly arrived bytes) and parses it from the start; this keeps
/// detectors simple pure functions of their input rather than needing to
/// persist partial-parse cursors across calls, while still satisfying
/// "tolerate mid-message interruption and resume correctly".
pub trait BoundaryDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&mut self, data: &[u8]) -> DetectOutcome;
    /// Clear any per-message state. Called after a complete message is
    /// extracted, or when the scanner resynchronises past malformed input.
    fn reset(&mut self);
}

type DetectorFactory = Box<dyn Fn() -> Box<dyn BoundaryDetector> + Send + Sync>;

/// Process-wide name → detector-factory map plus an optional "preferred"
/// protocol. Built once; each attached stream asks it for a fresh set of
/// stateful detector instances via [`DetectorRegistry::spawn_detectors`].
pub struct DetectorRegistry {
    order: Vec<String>,
    factories: AHashMap<String, DetectorFactory>,
    preferred: ArcSwapOption<str>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self { order: Vec::new(), factories: AHashMap::new(), preferred: ArcSwapOption::empty() }
    }

    /// Register or replace the detector factory for `name`. Replacing an
    /// existing name keeps its original position in the tie-break order.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn BoundaryDetector> + Send + Sync + 'static,
    {
        if !self.factories.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Build the default registry: HTTP, WebSocket, gRPC/HTTP-2, JSON, in
    /// that tie-break order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("http", || Box::new(HttpDetector::new()));
        registry.register("websocket", || Box::new(WebSocketDetector::new()));
        registry.register("grpc", || Box::new(GrpcDetector::new()));
        registry.register("json", || Box::new(JsonDetector::new()));
        registry
    }

    pub fn set_preferred(&self, protocol: Option<&str>) {
        self.preferred.store(protocol.map(|p| Arc::from(p)));
    }

    pub fn preferred(&self) -> Option<Arc<str>> {
        self.preferred.load_full()
    }

    /// Registration order, used to break auto-detect ties.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Instantiate one fresh, independently-stateful detector per
    /// registered name, in registration order, for a newly attached stream.
    pub fn spawn_detectors(&self) -> Vec<(String, Box<dyn BoundaryDetector>)> {
        self.order
            .iter()
            .map(|name| (name.clone(), (self.factories[name])()))
            .collect()
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_four_protocols_in_order() {
        let registry = DetectorRegistry::with_defaults();
        assert_eq!(registry.names(), &["http", "websocket", "grpc", "json"]);
    }

    #[test]
    fn re_registering_a_name_keeps_its_original_tie_break_position() {
        let mut registry = DetectorRegistry::with_defaults();
        registry.register("http", || Box::new(HttpDetector::new()));
        assert_eq!(registry.names(), &["http", "websocket", "grpc", "json"]);
    }

    #[test]
    fn preferred_protocol_round_trips() {
        let registry = DetectorRegistry::with_defaults();
        assert!(registry.preferred().is_none());
        registry.set_preferred(Some("http"));
        assert_eq!(registry.preferred().as_deref(), Some("http"));
        registry.set_preferred(None);
        assert!(registry.preferred().is_none());
    }

    #[test]
    fn spawned_detectors_are_independent_per_stream() {
        let registry = DetectorRegistry::with_defaults();
        let mut a = registry.spawn_detectors();
        let mut b = registry.spawn_detectors();
        let (_, http_a) = &mut a[0];
        let (_, http_b) = &mut b[0];
        // Feeding a's detector a partial request must not affect b's.
        let _ = http_a.detect(b"GET / HTTP/1.1\r\n");
        assert_eq!(http_b.detect(b"GET / HTTP/1.1\r\n"), DetectOutcome::NeedMoreData);
    }
}
