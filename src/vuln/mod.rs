//! Vulnerability checkers: two independent ordered lists, one run per
//! recovered frame and one run over a session's full frame sequence at
//! completion. Each checker is a free function rather than a trait object,
//! so invocation order matching checker registration order is a property
//! of a `const` slice, not something a runtime registration step could
//! get wrong.

mod per_frame;
mod per_session;
pub mod leak;

pub use leak::CrossSessionTracker;
pub use per_frame::PER_FRAME_CHECKERS;
pub use per_session::PER_SESSION_CHECKERS;

use crate::dissect::Frame;
use crate::finding::Finding;
use crate::session::Session;

/// Runs every per-frame checker against `frame`, concatenating findings in
/// registration order.
pub fn run_per_frame_checkers(frame: &Frame) -> Vec<Finding> {
    PER_FRAME_CHECKERS.iter().flat_map(|checker| checker(frame)).collect()
}

/// Runs every per-session checker against `session`, concatenating
/// findings in registration order. `tracker` carries cross-session state
/// forward between completions.
pub fn run_per_session_checkers(session: &Session, tracker: &mut CrossSessionTracker) -> Vec<Finding> {
    PER_SESSION_CHECKERS.iter().flat_map(|checker| checker(session, tracker)).collect()
}
