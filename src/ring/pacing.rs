use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// EWMA(α=0.3) bytes/sec tracker, sampled no more than once per 100ms, that
/// maps its current estimate onto a scan-interval table.
///
/// A `last_update` timestamp guards how often the estimate is allowed to
/// move, the same shape as a token-bucket rate gate but collapsed to a
/// single EWMA scalar rather than a windowed count, since the scanner is
/// the only caller of [`ScanPacer::sample`].
pub struct ScanPacer {
    start: Instant,
    last_update_ms: AtomicU64,
    last_bytes: AtomicU64,
    ewma_bits: AtomicU64,
}

const ALPHA: f64 = 0.3;
const SAMPLE_INTERVAL_MS: u64 = 100;

impl ScanPacer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last_update_ms: AtomicU64::new(0),
            last_bytes: AtomicU64::new(0),
            ewma_bits: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    /// Record that `total_bytes` have been scanned so far (a cumulative
    /// counter, not a delta). No-ops until at least 100ms have passed since
    /// the last sample.
    pub fn sample(&self, total_bytes: u64) {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let last_ms = self.last_update_ms.load(Ordering::Relaxed);
        let elapsed_ms = now_ms.saturating_sub(last_ms);
        if elapsed_ms < SAMPLE_INTERVAL_MS {
            return;
        }

        let last_bytes = self.last_bytes.load(Ordering::Relaxed);
        let dt_secs = elapsed_ms as f64 / 1000.0;
        let inst_rate = total_bytes.saturating_sub(last_bytes) as f64 / dt_secs;

        let prev = f64::from_bits(self.ewma_bits.load(Ordering::Relaxed));
        let next = ALPHA * inst_rate + (1.0 - ALPHA) * prev;

        self.ewma_bits.store(next.to_bits(), Ordering::Relaxed);
        self.last_update_ms.store(now_ms, Ordering::Relaxed);
        self.last_bytes.store(total_bytes, Ordering::Relaxed);
    }

    /// Current EWMA estimate of throughput, in bytes/sec.
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.ewma_bits.load(Ordering::Relaxed))
    }

    /// The scan interval prescribed for the current throughput estimate.
    pub fn interval(&self) -> Duration {
        interval_for_rate(self.rate())
    }
}

impl Default for ScanPacer {
    fn default() -> Self {
        Self::new()
    }
}

fn interval_for_rate(bytes_per_sec: f64) -> Duration {
    const MB: f64 = 1024.0 * 1024.0;
    const KB: f64 = 1024.0;
    if bytes_per_sec > 100.0 * MB {
        Duration::from_micros(100)
    } else if bytes_per_sec > 10.0 * MB {
        Duration::from_micros(500)
    } else if bytes_per_sec > 1.0 * MB {
        Duration::from_millis(1)
    } else if bytes_per_sec > 100.0 * KB {
        Duration::from_millis(5)
    } else {
        Duration::from_millis(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_table_is_monotone_with_throughput() {
        assert_eq!(interval_for_rate(0.0), Duration::from_millis(10));
        assert_eq!(interval_for_rate(150.0 * 1024.0), Duration::from_millis(5));
        assert_eq!(interval_for_rate(2.0 * 1024.0 * 1024.0), Duration::from_millis(1));
        assert_eq!(interval_for_rate(20.0 * 1024.0 * 1024.0), Duration::from_micros(500));
        assert_eq!(interval_for_rate(200.0 * 1024.0 * 1024.0), Duration::from_micros(100));
    }

    #[test]
    fn sample_is_a_no_op_before_the_100ms_floor() {
        let pacer = ScanPacer::new();
        pacer.sample(1_000_000);
        pacer.sample(2_000_000);
        // Second sample landed within the same 100ms window; rate still 0.
        assert_eq!(pacer.rate(), 0.0);
    }
}
