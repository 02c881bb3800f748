#![forbid(unsafe_code)]

use protoscan_core::config::RingBufferConfig;
use protoscan_core::ring::RingBuffer;

/// Scenario 6: a 65,536-byte ring accepts 60,000 bytes, then rejects a
/// 10,000-byte write at 90%+ fill; once the scanner drains 20,000 bytes,
/// the retried write succeeds.
#[test]
fn backpressure_rejects_at_high_water_and_recovers_after_drain() {
    let ring = RingBuffer::new("bench", &RingBufferConfig { capacity: 65_536, high_water_frac: 0.9 });

    assert!(ring.write(&vec![0u8; 60_000]).is_written());
    assert!(!ring.write(&vec![0u8; 10_000]).is_written(), "write above the high-water mark must be rejected");

    let mut scratch = Vec::new();
    let drained = ring.drain_into(&mut scratch, 20_000);
    assert_eq!(drained, 20_000);

    assert!(ring.write(&vec![0u8; 10_000]).is_written(), "retry after drain must succeed");
}

#[test]
fn ring_at_ninety_percent_fill_rejects_further_writes() {
    let ring = RingBuffer::new("s1", &RingBufferConfig { capacity: 65_536, high_water_frac: 0.9 });
    // floor(65_536 * 0.9) = 58_982, the high-water mark.
    assert!(ring.write(&vec![0u8; 58_982]).is_written());
    assert!(!ring.write(&[0u8; 1]).is_written());
}

#[test]
fn ring_at_eighty_nine_percent_fill_still_accepts_writes() {
    let ring = RingBuffer::new("s2", &RingBufferConfig { capacity: 65_536, high_water_frac: 0.9 });
    // floor(65_536 * 0.89) = 58_327, one byte below the high-water mark.
    assert!(ring.write(&vec![0u8; 58_327]).is_written());
    assert!(ring.write(&[0u8; 1]).is_written());
}
