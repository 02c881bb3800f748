use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::dissect::Frame;
use crate::protocol::Protocol;
use crate::telemetry::Sink;
use crate::vuln::{run_per_frame_checkers, run_per_session_checkers, CrossSessionTracker};

use super::types::Session;

/// Default width of the [`CrossSessionTracker`]'s sliding window. Not
/// independently configurable; sized generously relative to the default
/// session idle timeout (30s) so a leaked value stays detectable across a
/// full session lifetime on either side.
const CROSS_SESSION_WINDOW: Duration = Duration::from_secs(300);

/// Bounded map `session_id -> Session`, aggregating frames into sessions,
/// running the per-session vulnerability checkers, and completing sessions
/// on protocol end or idle timeout.
///
/// The outer map is an `RwLock` (many concurrent read-mostly lookups, a
/// write lock only to insert a first-seen id or remove a terminal one);
/// each entry is independently `Mutex`-guarded for its append path, the
/// same "lock-free outer map, per-entry mutex" shape a rate-limit
/// manager uses for its own per-route state.
pub struct SessionManager {
    active: RwLock<AHashMap<String, Arc<Mutex<Session>>>>,
    completion_tx: mpsc::Sender<Session>,
    sink: Arc<Sink>,
    config: SessionConfig,
    leak_tracker: Mutex<CrossSessionTracker>,
    completion_dropped: AtomicU64,
}

impl SessionManager {
    /// Builds a manager plus the receiving half of its bounded
    /// completed-session channel. Does not start the janitor;
    /// call [`SessionManager::spawn_janitor`] on the returned `Arc`.
    pub fn new(config: SessionConfig, sink: Arc<Sink>) -> (Arc<Self>, mpsc::Receiver<Session>) {
        let (completion_tx, completion_rx) = mpsc::channel(config.completion_channel_depth);
        let manager = Arc::new(Self {
            active: RwLock::new(AHashMap::new()),
            completion_tx,
            sink,
            config,
            leak_tracker: Mutex::new(CrossSessionTracker::new(CROSS_SESSION_WINDOW)),
            completion_dropped: AtomicU64::new(0),
        });
        (manager, completion_rx)
    }

    pub fn active_session_count(&self) -> usize {
        self.active.try_read().map(|map| map.len()).unwrap_or(0)
    }

    /// Completed sessions whose completion notification could not be
    /// enqueued (channel at [`crate::config::SessionConfig::completion_channel_depth`]).
    /// The session's frames and findings are never lost on this path —
    /// only the notification that would have told a consumer it was done.
    pub fn completion_dropped(&self) -> u64 {
        self.completion_dropped.load(Ordering::Relaxed)
    }

    /// Create-if-absent, append `frame`, run per-frame checkers, and
    /// complete the session if this append satisfies its protocol's
    /// terminal condition.
    pub async fn add_frame(&self, session_id: &str, protocol: Protocol, frame: Frame) {
        let handle = self.get_or_create(session_id, protocol).await;

        let became_terminal = {
            let mut session = handle.lock().await;
            if session.is_terminal() {
                // A session already terminal accepts no further frames.
                false
            } else {
                let findings = run_per_frame_checkers(&frame);
                for finding in &findings {
                    self.sink.record_finding(finding);
                }
                session.findings.extend(findings);
                session.append(frame)
            }
        };

        if became_terminal {
            self.complete_handle(session_id, handle).await;
        }
    }

    /// Force-terminate a session regardless of protocol state.
    pub async fn complete(&self, session_id: &str) {
        let handle = {
            let map = self.active.read().await;
            map.get(session_id).cloned()
        };
        let Some(handle) = handle else { return };
        {
            let mut session = handle.lock().await;
            session.force_terminal();
        }
        self.complete_handle(session_id, handle).await;
    }

    async fn get_or_create(&self, session_id: &str, protocol: Protocol) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.active.read().await.get(session_id) {
            return existing.clone();
        }
        let mut map = self.active.write().await;
        map.entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(session_id, protocol))))
            .clone()
    }

    /// Removes `session_id` from the active map, runs per-session checkers,
    /// and forwards the finished session to the completion channel
    /// (dropping only the notification, not the session, on overflow).
    async fn complete_handle(&self, session_id: &str, handle: Arc<Mutex<Session>>) {
        self.active.write().await.remove(session_id);

        let finished = {
            let mut session = handle.lock().await;
            let session_findings = {
                let mut tracker = self.leak_tracker.lock().await;
                run_per_session_checkers(&session, &mut tracker)
            };
            for finding in &session_findings {
                self.sink.record_finding(finding);
            }
            session.findings.extend(session_findings);
            session.clone()
        };

        debug!(session_id, frame_count = finished.frames.len(), "session completed");
        if self.completion_tx.try_send(finished).is_err() {
            warn!(session_id, "completion channel full, dropping completion notification");
            self.completion_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Background janitor: every `cleanup_interval`, completes any session
    /// idle for longer than `idle_timeout`. Takes `self: &Arc<Self>` so the
    /// spawned task can outlive the caller's borrow.
    pub fn spawn_janitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(manager.config.cleanup_interval());
            loop {
                ticker.tick().await;
                manager.sweep_idle().await;
            }
        })
    }

    async fn sweep_idle(&self) {
        let idle_timeout = self.config.idle_timeout();
        let now = Instant::now();

        let expired: Vec<(String, Arc<Mutex<Session>>)> = {
            let map = self.active.read().await;
            let mut out = Vec::new();
            for (id, handle) in map.iter() {
                let session = handle.lock().await;
                if now.duration_since(session.last_active) > idle_timeout {
                    out.push((id.clone(), handle.clone()));
                }
            }
            out
        };

        if !expired.is_empty() {
            debug!(count = expired.len(), "sweeping idle-timed-out sessions");
        }
        for (id, handle) in expired {
            {
                let mut session = handle.lock().await;
                session.mark_idle_timeout();
            }
            self.complete_handle(&id, handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dissect::FieldValue;
    use bytes::Bytes;

    fn http_frame(fields: &[(&str, &str)]) -> Frame {
        let mut map = ahash::AHashMap::new();
        for (k, v) in fields {
            map.insert(k.to_string(), FieldValue::Str(v.to_string()));
        }
        Frame { protocol: Protocol::Http, fields: map, raw: Bytes::new(), timestamp: Instant::now() }
    }

    #[tokio::test]
    async fn http_session_completes_and_is_removed_from_the_active_map() {
        let sink = Sink::init();
        let (manager, mut completion_rx) = SessionManager::new(SessionConfig::default(), sink);

        manager.add_frame("s1", Protocol::Http, http_frame(&[("method", "GET")])).await;
        assert_eq!(manager.active_session_count(), 1);

        manager.add_frame("s1", Protocol::Http, http_frame(&[("status", "200")])).await;
        assert_eq!(manager.active_session_count(), 0);

        let completed = completion_rx.recv().await.expect("completion notification");
        assert_eq!(completed.id, "s1");
        assert_eq!(completed.frames.len(), 2);
    }

    #[tokio::test]
    async fn frames_after_termination_are_not_appended() {
        let sink = Sink::init();
        let (manager, _rx) = SessionManager::new(SessionConfig::default(), sink);

        manager.add_frame("s1", Protocol::WebSocket, Frame {
            protocol: Protocol::WebSocket,
            fields: {
                let mut m = ahash::AHashMap::new();
                m.insert("opcode".to_string(), FieldValue::Int(8));
                m
            },
            raw: Bytes::new(),
            timestamp: Instant::now(),
        }).await;
        assert_eq!(manager.active_session_count(), 0);

        manager.add_frame("s1", Protocol::WebSocket, Frame {
            protocol: Protocol::WebSocket,
            fields: ahash::AHashMap::new(),
            raw: Bytes::new(),
            timestamp: Instant::now(),
        }).await;
        // The old session already completed; a fresh one is created for
        // the new frame under the same id, which is expected and distinct
        // from "appending to a terminal session".
        assert_eq!(manager.active_session_count(), 1);
    }

    #[tokio::test]
    async fn force_complete_terminates_a_non_terminal_session() {
        let sink = Sink::init();
        let (manager, mut completion_rx) = SessionManager::new(SessionConfig::default(), sink);

        manager.add_frame("s1", Protocol::Json, Frame {
            protocol: Protocol::Json,
            fields: ahash::AHashMap::new(),
            raw: Bytes::new(),
            timestamp: Instant::now(),
        }).await;
        assert_eq!(manager.active_session_count(), 1);

        manager.complete("s1").await;
        assert_eq!(manager.active_session_count(), 0);
        let completed = completion_rx.recv().await.expect("completion notification");
        assert_eq!(completed.id, "s1");
    }

    #[tokio::test]
    async fn weak_session_id_finding_is_recorded_on_completion() {
        let sink = Sink::init();
        let (manager, mut completion_rx) = SessionManager::new(SessionConfig::default(), sink);

        manager.add_frame("123456789012", Protocol::Json, Frame {
            protocol: Protocol::Json,
            fields: ahash::AHashMap::new(),
            raw: Bytes::new(),
            timestamp: Instant::now(),
        }).await;
        manager.complete("123456789012").await;

        let completed = completion_rx.recv().await.expect("completion notification");
        assert!(completed.findings.iter().any(|f| f.kind == "weak_session_id"));
    }
}
