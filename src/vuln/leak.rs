use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Sliding window of sensitive-value hashes observed across sessions.
///
/// Backs the `cross_session_data_leak` checker: a value hashed here from
/// session A, then looked up again while processing session B within
/// `window`, means the same secret resurfaced somewhere it shouldn't have.
/// Values themselves are never retained, only their SHA-256 digest plus
/// the session id and time they were seen.
pub struct CrossSessionTracker {
    window: Duration,
    seen: VecDeque<(String, String, Instant)>,
}

impl CrossSessionTracker {
    pub fn new(window: Duration) -> Self {
        Self { window, seen: VecDeque::new() }
    }

    fn prune(&mut self, now: Instant) {
        while let Some((_, _, seen_at)) = self.seen.front() {
            if now.duration_since(*seen_at) > self.window {
                self.seen.pop_front();
            } else {
                break;
            }
        }
    }

    /// Checks `value` against every hash recorded from a session other
    /// than `session_id` within the window, then records it under
    /// `session_id`. Returns the other session's id on a match.
    pub fn check_and_record(&mut self, session_id: &str, value: &str) -> Option<String> {
        let now = Instant::now();
        self.prune(now);
        let hash = hash_value(value);
        let hit = self
            .seen
            .iter()
            .find(|(seen_hash, seen_session, _)| seen_hash == &hash && seen_session != session_id)
            .map(|(_, seen_session, _)| seen_session.clone());
        self.seen.push_back((hash, session_id.to_string(), now));
        hit
    }
}

fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
