mod buffer;
mod index;
mod pacing;

pub use buffer::{RingBuffer, RingStats, WriteOutcome};
pub use index::{pack, unpack, VersionedIndex};
pub use pacing::ScanPacer;
