//! Micro benchmarks for the lock-free ring buffer's write and drain paths.
//! Pure CPU, single producer thread - no tokio runtime involved.
//!
//! ```bash
//! cargo bench --bench bench_ring
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use protoscan_core::config::RingBufferConfig;
use protoscan_core::ring::RingBuffer;

const SMALL_CHUNK: &[u8] = &[0x42; 256];
const LARGE_CHUNK: &[u8] = &[0x42; 8192];

fn bench_write_small_chunks(c: &mut Criterion) {
    let ring = RingBuffer::new("bench", &RingBufferConfig { capacity: 1024 * 1024, high_water_frac: 0.9 });

    c.bench_function("ring_write_256b", |b| {
        b.iter(|| {
            let outcome = ring.write(std::hint::black_box(SMALL_CHUNK));
            if !outcome.is_written() {
                // Drain to keep the buffer below high water so the loop
                // measures steady-state writes, not backpressure.
                let mut scratch = Vec::new();
                ring.drain_into(&mut scratch, ring.capacity());
            }
        });
    });
}

fn bench_write_large_chunks(c: &mut Criterion) {
    let ring = RingBuffer::new("bench", &RingBufferConfig { capacity: 1024 * 1024, high_water_frac: 0.9 });

    c.bench_function("ring_write_8kb", |b| {
        b.iter(|| {
            let outcome = ring.write(std::hint::black_box(LARGE_CHUNK));
            if !outcome.is_written() {
                let mut scratch = Vec::new();
                ring.drain_into(&mut scratch, ring.capacity());
            }
        });
    });
}

fn bench_write_then_drain_round_trip(c: &mut Criterion) {
    let ring = RingBuffer::new("bench", &RingBufferConfig { capacity: 1024 * 1024, high_water_frac: 0.9 });
    let mut scratch = Vec::with_capacity(65_536);

    c.bench_function("ring_write_drain_round_trip", |b| {
        b.iter(|| {
            ring.write(std::hint::black_box(SMALL_CHUNK));
            scratch.clear();
            ring.drain_into(&mut scratch, 65_536);
        });
    });
}

criterion_group!(ring_benches, bench_write_small_chunks, bench_write_large_chunks, bench_write_then_drain_round_trip);
criterion_main!(ring_benches);
