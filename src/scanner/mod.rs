mod event;

use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::interval;

use tracing::{debug, trace, warn};

use crate::detect::{BoundaryDetector, DetectOutcome, DetectorRegistry};
use crate::protocol::Protocol;
use crate::ring::RingBuffer;
use crate::telemetry::Sink;

pub use event::{MetadataValue, ProtocolEvent, ProtocolStats};

/// Drives the consumer side of a [`RingBuffer`] for one attached stream:
/// drains bytes, runs them through the registered boundary detectors, and
/// publishes one [`ProtocolEvent`] per recovered message.
pub struct Scanner {
    stream_id: String,
    ring: Arc<RingBuffer>,
    registry: Arc<DetectorRegistry>,
    detectors: Vec<(String, Box<dyn BoundaryDetector>)>,
    event_tx: mpsc::Sender<ProtocolEvent>,
    sink: Arc<Sink>,
    scan_scratch: usize,
    max_event_size: usize,
    partial: Vec<u8>,
    base_offset: u64,
    sequence: u64,
    stats: AHashMap<Protocol, ProtocolStats>,
}

impl Scanner {
    pub fn new(
        stream_id: impl Into<String>,
        ring: Arc<RingBuffer>,
        registry: Arc<DetectorRegistry>,
        event_tx: mpsc::Sender<ProtocolEvent>,
        sink: Arc<Sink>,
        scan_scratch: usize,
        max_event_size: usize,
    ) -> Self {
        let detectors = registry.spawn_detectors();
        Self {
            stream_id: stream_id.into(),
            ring,
            registry,
            detectors,
            event_tx,
            sink,
            scan_scratch,
            max_event_size,
            partial: Vec::new(),
            base_offset: 0,
            sequence: 0,
            stats: AHashMap::new(),
        }
    }

    pub fn stats(&self) -> &AHashMap<Protocol, ProtocolStats> {
        &self.stats
    }

    /// Drain one batch from the ring, recover as many complete messages as
    /// possible, publish them, and retain any trailing partial message for
    /// the next call.
    async fn scan_once(&mut self) {
        let started = Instant::now();

        let mut buf = std::mem::take(&mut self.partial);
        let drained = self.ring.drain_into(&mut buf, self.scan_scratch);
        if drained == 0 && buf.is_empty() {
            self.partial = buf;
            self.sink.scan_duration_seconds.record(started.elapsed().as_secs_f64(), &[]);
            return;
        }

        let events = self.recover_messages(&mut buf);
        self.partial = buf;

        for event in events {
            self.sink.record_protocol_detected(event.protocol.as_str(), event.bytes.len() as u64);
            record_stat(&mut self.stats, &event);
            if self.event_tx.try_send(event).is_err() {
                warn!(stream_id = %self.stream_id, "event channel full, dropping recovered message");
                self.sink.event_dropped.add(1, &[]);
            }
        }

        self.sink.scan_duration_seconds.record(started.elapsed().as_secs_f64(), &[]);
    }

    /// Pure recovery loop over `buf`: tries detectors at `buf[cursor..]`,
    /// emits events for every complete match, and leaves only the
    /// undecided tail in `buf` on return.
    fn recover_messages(&mut self, buf: &mut Vec<u8>) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        let mut cursor = 0usize;
        let preferred = self.registry.preferred();

        loop {
            if cursor >= buf.len() {
                break;
            }
            let window = &buf[cursor..];

            let outcome = match preferred.as_deref() {
                Some(name) => self.try_one(name, window),
                None => self.try_all(window),
            };

            match outcome {
                Some((name, DetectOutcome::Found { size })) => {
                    let protocol = Protocol::from_detector_name(&name).expect("registered detector name");
                    let raw = &window[..size];
                    if raw.len() > self.max_event_size {
                        warn!(stream_id = %self.stream_id, protocol = protocol.as_str(), size, "dropping oversized message");
                        self.sink.record_parse_error(protocol.as_str());
                    } else {
                        trace!(stream_id = %self.stream_id, protocol = protocol.as_str(), size, "recovered message");
                        events.push(self.build_event(protocol, raw, cursor as u64));
                    }
                    cursor += size;
                    self.reset_all();
                }
                Some((_, DetectOutcome::NeedMoreData)) | None => break,
                Some((_, DetectOutcome::Invalid)) => {
                    // Hard parse failure: resync by one byte.
                    debug!(stream_id = %self.stream_id, cursor, "no detector recognised input, resyncing one byte");
                    self.sink.record_parse_error("unknown");
                    cursor += 1;
                    self.reset_all();
                }
            }
        }

        self.base_offset += cursor as u64;
        buf.drain(..cursor);
        events
    }

    fn try_one(&mut self, name: &str, window: &[u8]) -> Option<(String, DetectOutcome)> {
        self.detectors
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(n, d)| (n.clone(), d.detect(window)))
    }

    fn try_all(&mut self, window: &[u8]) -> Option<(String, DetectOutcome)> {
        let mut saw_need_more = false;
        for (name, detector) in self.detectors.iter_mut() {
            match detector.detect(window) {
                DetectOutcome::Found { size } => return Some((name.clone(), DetectOutcome::Found { size })),
                DetectOutcome::NeedMoreData => saw_need_more = true,
                DetectOutcome::Invalid => {}
            }
        }
        if saw_need_more {
            Some(("".to_string(), DetectOutcome::NeedMoreData))
        } else {
            Some(("".to_string(), DetectOutcome::Invalid))
        }
    }

    fn reset_all(&mut self) {
        for (_, detector) in self.detectors.iter_mut() {
            detector.reset();
        }
    }

    fn build_event(&mut self, protocol: Protocol, raw: &[u8], cursor_offset: u64) -> ProtocolEvent {
        let sequence = self.sequence;
        self.sequence += 1;
        let offset = self.base_offset + cursor_offset;
        let (frame_type, metadata) = event::describe(protocol, raw);
        ProtocolEvent {
            protocol,
            frame_type,
            bytes: Bytes::copy_from_slice(raw),
            offset,
            sequence,
            timestamp: Instant::now(),
            metadata,
        }
    }

    /// Run until the ring is closed and fully drained.
    pub async fn run(mut self) {
        debug!(stream_id = %self.stream_id, "scanner started");
        loop {
            self.scan_once().await;
            self.sink.scans.add(1, &[]);

            if self.ring.is_closed() {
                let stats = self.ring.stats();
                if stats.used == 0 && self.partial.is_empty() {
                    debug!(stream_id = %self.stream_id, "scanner exiting, ring closed and drained");
                    break;
                }
            }

            let sleep_for = self.ring.stats().scan_interval.max(Duration::from_micros(100));
            let mut ticker = interval(sleep_for);
            ticker.tick().await;
            ticker.tick().await;
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

fn record_stat(stats: &mut AHashMap<Protocol, ProtocolStats>, event: &ProtocolEvent) {
    let entry = stats.entry(event.protocol).or_default();
    entry.record(event.bytes.len() as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RingBufferConfig;

    fn make_scanner(registry: Arc<DetectorRegistry>) -> (Scanner, mpsc::Receiver<ProtocolEvent>, Arc<RingBuffer>) {
        let ring = Arc::new(RingBuffer::new("s1", &RingBufferConfig { capacity: 65_536, high_water_frac: 0.9 }));
        let (tx, rx) = mpsc::channel(16);
        let sink = Sink::init();
        let scanner = Scanner::new("s1", ring.clone(), registry, tx, sink, 65_536, 1_000_000);
        (scanner, rx, ring)
    }

    #[test]
    fn recovers_one_http_request_from_a_single_buffer() {
        let registry = Arc::new(DetectorRegistry::with_defaults());
        let (mut scanner, _rx, _ring) = make_scanner(registry);
        let mut buf = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec();
        let events = scanner.recover_messages(&mut buf);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].protocol, Protocol::Http);
        assert!(buf.is_empty());
    }

    #[test]
    fn leaves_a_trailing_partial_message_in_the_buffer() {
        let registry = Arc::new(DetectorRegistry::with_defaults());
        let (mut scanner, _rx, _ring) = make_scanner(registry);
        let mut buf = b"GET / HTTP/1.1\r\nHost: x\r\n".to_vec();
        let events = scanner.recover_messages(&mut buf);
        assert!(events.is_empty());
        assert_eq!(buf, b"GET / HTTP/1.1\r\nHost: x\r\n");
    }

    #[test]
    fn oversized_message_is_dropped_but_still_consumed() {
        let registry = Arc::new(DetectorRegistry::with_defaults());
        let ring = Arc::new(RingBuffer::new("s1", &RingBufferConfig { capacity: 65_536, high_water_frac: 0.9 }));
        let (tx, _rx) = mpsc::channel(16);
        let sink = Sink::init();
        let mut scanner = Scanner::new("s1", ring, registry, tx, sink, 65_536, 10);
        let mut buf = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec();
        let events = scanner.recover_messages(&mut buf);
        assert!(events.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn sequence_numbers_increase_across_multiple_messages_in_one_buffer() {
        let registry = Arc::new(DetectorRegistry::with_defaults());
        let (mut scanner, _rx, _ring) = make_scanner(registry);
        let mut buf = b"{\"a\":1}{\"b\":2}".to_vec();
        let events = scanner.recover_messages(&mut buf);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 0);
        assert_eq!(events[1].sequence, 1);
    }
}
