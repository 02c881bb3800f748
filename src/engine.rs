use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::detect::DetectorRegistry;
use crate::dissect::{self, SessionContext, SessionIdOutcome};
use crate::finding::Finding;
use crate::protocol::Protocol;
use crate::ring::{RingBuffer, WriteOutcome};
use crate::scanner::{ProtocolEvent, ProtocolStats, Scanner};
use crate::session::SessionManager;
use crate::telemetry::Sink;

/// Handle to one attached byte stream.
///
/// Attachment layers outside this crate (reading a TCP socket, replaying a
/// pcap, tailing a file) own the loop that calls [`StreamHandle::write`];
/// this crate never reads from an OS stream itself.
pub struct StreamHandle {
    stream_id: String,
    ring: Arc<RingBuffer>,
    sink: Arc<Sink>,
}

impl StreamHandle {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn write(&self, bytes: &[u8]) -> WriteOutcome {
        let outcome = self.ring.write(bytes);
        match outcome {
            WriteOutcome::Written(n) => self.sink.written_bytes.add(n as u64, &[]),
            WriteOutcome::BufferFull => self.sink.write_dropped.add(1, &[]),
            WriteOutcome::Closed => {}
        }
        outcome
    }

    pub fn close(&self) {
        self.ring.close();
    }
}

/// The crate's composition root: one detector registry, one telemetry
/// sink, and one session manager shared across every attached stream.
///
/// `Engine` is the intended top-level type for an external process
/// attachment layer to hold: it never touches a socket or a file itself,
/// it only turns bytes handed to it via [`StreamHandle::write`] into
/// frames, sessions, and findings.
pub struct Engine {
    config: Config,
    registry: Arc<DetectorRegistry>,
    sink: Arc<Sink>,
    session_manager: Arc<SessionManager>,
    stats: Arc<RwLock<AHashMap<String, AHashMap<Protocol, ProtocolStats>>>>,
    _janitor: JoinHandle<()>,
    _completion_drain: JoinHandle<()>,
}

impl Engine {
    /// Validates `config`, builds the default detector registry, and
    /// starts the session janitor. Returns [`crate::error::CoreError::Config`]
    /// if `config` fails [`Config::validate`].
    pub fn new(config: Config) -> crate::error::Result<Self> {
        config.validate()?;

        let registry = Arc::new(DetectorRegistry::with_defaults());
        registry.set_preferred(config.preferred_protocol.as_deref());
        let sink = Sink::init();
        let (session_manager, mut completion_rx) = SessionManager::new(config.session.clone(), sink.clone());
        let janitor = session_manager.spawn_janitor();

        // Completed sessions are already reported through `on_finding` at
        // completion time; nothing downstream of this crate currently
        // consumes the `Session` objects themselves, so this task only
        // keeps the bounded completion channel from backing up.
        let completion_drain = tokio::spawn(async move { while completion_rx.recv().await.is_some() {} });

        info!(preferred_protocol = ?config.preferred_protocol, "engine started");
        Ok(Self {
            config,
            registry,
            sink,
            session_manager,
            stats: Arc::new(RwLock::new(AHashMap::new())),
            _janitor: janitor,
            _completion_drain: completion_drain,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a callback invoked for every finding recorded anywhere in
    /// this engine, per-frame and per-session alike.
    pub fn on_finding<F>(&self, callback: F)
    where
        F: Fn(&Finding) + Send + Sync + 'static,
    {
        self.sink.on_finding(callback);
    }

    /// Rolling per-protocol detection stats for one attached stream, or
    /// `None` if the stream hasn't detected anything yet (or never existed).
    pub async fn events(&self, stream_id: &str) -> Option<AHashMap<Protocol, ProtocolStats>> {
        self.stats.read().await.get(stream_id).cloned()
    }

    pub fn active_session_count(&self) -> usize {
        self.session_manager.active_session_count()
    }

    /// Attach a new stream: builds its ring buffer, spawns the boundary
    /// scanner and the dissect-and-aggregate loop that feeds frames to the
    /// shared [`SessionManager`], and returns a handle the caller feeds
    /// bytes into.
    pub fn attach(&self, stream_id: impl Into<String>, ring_config: crate::config::RingBufferConfig) -> StreamHandle {
        let stream_id = stream_id.into();
        info!(stream_id = %stream_id, capacity = ring_config.capacity, "attaching stream");
        let ring = Arc::new(RingBuffer::new(stream_id.clone(), &ring_config));

        let (event_tx, event_rx) = mpsc::channel(self.config.event_channel_depth);
        let scanner = Scanner::new(
            stream_id.clone(),
            ring.clone(),
            self.registry.clone(),
            event_tx,
            self.sink.clone(),
            self.config.scan_scratch,
            self.config.max_event_size(),
        );
        tokio::spawn(scanner.run());

        tokio::spawn(drive_dissect_loop(
            stream_id.clone(),
            event_rx,
            self.sink.clone(),
            self.session_manager.clone(),
            self.stats.clone(),
        ));

        StreamHandle { stream_id, ring, sink: self.sink.clone() }
    }
}

/// Consumes recovered messages for one stream, dissects each into a typed
/// [`crate::dissect::Frame`], derives its session id, and hands it to the
/// shared session manager. Runs until its `Scanner` closes the event
/// channel (the ring was closed and fully drained).
async fn drive_dissect_loop(
    stream_id: String,
    mut event_rx: mpsc::Receiver<ProtocolEvent>,
    sink: Arc<Sink>,
    session_manager: Arc<SessionManager>,
    stats: Arc<RwLock<AHashMap<String, AHashMap<Protocol, ProtocolStats>>>>,
) {
    while let Some(event) = event_rx.recv().await {
        sink.events_sent.add(1, &[]);

        {
            let mut all_stats = stats.write().await;
            let per_protocol = all_stats.entry(stream_id.clone()).or_default();
            per_protocol.entry(event.protocol).or_default().record(event.bytes.len() as u64);
        }

        let dissector = dissect::for_protocol(event.protocol);
        let dissect_started = Instant::now();
        let dissect_result = dissector.dissect(&event.bytes);
        sink.dissect_duration_seconds.record(dissect_started.elapsed().as_secs_f64(), &[]);
        let frame = match dissect_result {
            Ok(frame) => frame,
            Err(err) => {
                debug!(stream_id = %stream_id, protocol = event.protocol.as_str(), %err, "dissect failed, dropping message");
                sink.record_parse_error(event.protocol.as_str());
                continue;
            }
        };

        for finding in dissector.find_sensitive(&frame) {
            sink.record_finding(&finding);
        }

        let ctx = SessionContext { endpoints: None, connection_id: Some(&stream_id) };
        let session_id = match dissector.session_id(&frame, &ctx) {
            SessionIdOutcome::Id(id) => id,
            // No stable in-frame marker; fall back to the attachment's own
            // stream id, the closest thing this crate has to a connection
            // identity without a process-attachment layer supplying one.
            SessionIdOutcome::NeedsConnectionContext => stream_id.clone(),
        };

        session_manager.add_frame(&session_id, event.protocol, frame).await;
    }
}
