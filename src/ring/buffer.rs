use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use super::index::{pack, unpack, VersionedIndex};
use super::pacing::ScanPacer;
use crate::config::RingBufferConfig;

/// Outcome of a [`RingBuffer::write`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The whole slice was reserved and copied.
    Written(usize),
    /// Used bytes are at or above the high-water mark, or the slice would
    /// not fit; nothing was written.
    BufferFull,
    /// `close()` has already been called; the producer must not retry.
    Closed,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written(_))
    }
}

/// Point-in-time snapshot returned by [`RingBuffer::stats`].
#[derive(Debug, Clone, Copy)]
pub struct RingStats {
    pub used: usize,
    pub capacity: usize,
    pub write_dropped: u64,
    pub write_rate_bytes_per_sec: f64,
    pub scan_interval: Duration,
    pub backpressure: bool,
}

/// Single-slot, bounded, multi-producer/single-consumer byte buffer with
/// ABA-safe versioned indices.
///
/// Storage is a fixed-length boxed slice of `AtomicU8` rather than a
/// `Mutex<Vec<u8>>` or raw pointer arithmetic, so the buffer never needs
/// `unsafe`. Producers only ever store into the disjoint byte range their
/// CAS reserved, so no synchronization beyond the index CAS itself is
/// required — the per-byte atomic store exists to satisfy the borrow
/// checker, not because per-byte atomicity is otherwise meaningful here.
pub struct RingBuffer {
    stream_id: String,
    capacity: usize,
    mask: usize,
    high_water_frac: f64,
    data: Box<[AtomicU8]>,
    write: AtomicU64,
    read: AtomicU64,
    closed: AtomicBool,
    write_dropped: AtomicU64,
    pacer: ScanPacer,
}

impl RingBuffer {
    pub fn new(stream_id: impl Into<String>, config: &RingBufferConfig) -> Self {
        let capacity = config.rounded_capacity();
        let data = (0..capacity).map(|_| AtomicU8::new(0)).collect::<Vec<_>>().into_boxed_slice();
        Self {
            stream_id: stream_id.into(),
            capacity,
            mask: capacity - 1,
            high_water_frac: config.high_water_frac,
            data,
            write: AtomicU64::new(pack(0, 0)),
            read: AtomicU64::new(pack(0, 0)),
            closed: AtomicBool::new(false),
            write_dropped: AtomicU64::new(0),
            pacer: ScanPacer::new(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn high_water_mark(&self) -> usize {
        (self.capacity as f64 * self.high_water_frac) as usize
    }

    fn used(&self, write_idx: VersionedIndex, read_idx: VersionedIndex) -> usize {
        let (_, write_off) = unpack(write_idx);
        let (_, read_off) = unpack(read_idx);
        write_off.wrapping_sub(read_off) as usize
    }

    /// Reserve and copy `bytes` into the ring. All-or-nothing: either every
    /// byte is written, contiguously (modulo wrap), at `[old_write,
    /// old_write+len)`, or nothing is.
    pub fn write(&self, bytes: &[u8]) -> WriteOutcome {
        if self.closed.load(Ordering::Acquire) {
            return WriteOutcome::Closed;
        }
        let len = bytes.len();
        loop {
            let old_write = self.write.load(Ordering::Acquire);
            let read_idx = self.read.load(Ordering::Acquire);
            let used = self.used(old_write, read_idx);

            if self.closed.load(Ordering::Acquire) {
                return WriteOutcome::Closed;
            }
            if used >= self.high_water_mark() || used + len > self.capacity {
                self.write_dropped.fetch_add(1, Ordering::Relaxed);
                return WriteOutcome::BufferFull;
            }

            let (old_ver, old_off) = unpack(old_write);
            let new_off = old_off.wrapping_add(len as u32);
            let new_write = pack(old_ver.wrapping_add(1), new_off);

            if self
                .write
                .compare_exchange_weak(old_write, new_write, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            for (i, byte) in bytes.iter().enumerate() {
                let slot = (old_off.wrapping_add(i as u32) as usize) & self.mask;
                self.data[slot].store(*byte, Ordering::Relaxed);
            }
            return WriteOutcome::Written(len);
        }
    }

    /// Idempotent. After close, [`RingBuffer::write`] always returns
    /// `Closed`; the consumer may keep draining remaining bytes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Copy up to `max` available bytes into `scratch` (appended, not
    /// cleared first) and advance `read` by the number of bytes copied.
    /// Single-consumer: the scanner task is the only caller.
    pub fn drain_into(&self, scratch: &mut Vec<u8>, max: usize) -> usize {
        let write_idx = self.write.load(Ordering::Acquire);
        let read_idx = self.read.load(Ordering::Acquire);
        let (read_ver, read_off) = unpack(read_idx);
        let available = self.used(write_idx, read_idx);
        let n = available.min(max);

        scratch.reserve(n);
        for i in 0..n {
            let slot = (read_off.wrapping_add(i as u32) as usize) & self.mask;
            scratch.push(self.data[slot].load(Ordering::Relaxed));
        }

        let new_read = pack(read_ver.wrapping_add(1), read_off.wrapping_add(n as u32));
        self.read.store(new_read, Ordering::Release);

        self.pacer.sample(read_off.wrapping_add(n as u32) as u64);
        n
    }

    pub fn stats(&self) -> RingStats {
        let write_idx = self.write.load(Ordering::Acquire);
        let read_idx = self.read.load(Ordering::Acquire);
        let used = self.used(write_idx, read_idx);
        RingStats {
            used,
            capacity: self.capacity,
            write_dropped: self.write_dropped.load(Ordering::Relaxed),
            write_rate_bytes_per_sec: self.pacer.rate(),
            scan_interval: self.pacer.interval(),
            backpressure: used >= self.high_water_mark(),
        }
    }
}
