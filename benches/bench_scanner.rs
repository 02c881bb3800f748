//! Micro benchmarks for boundary detection and dissection, the two CPU-bound
//! steps a `Scanner` drives per recovered message.
//!
//! ```bash
//! cargo bench --bench bench_scanner
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use protoscan_core::detect::DetectorRegistry;
use protoscan_core::dissect;
use protoscan_core::Protocol;

const HTTP_REQUEST: &[u8] =
    b"GET /api/session HTTP/1.1\r\nHost: example.com\r\nCookie: session=abc123\r\nUser-Agent: bench\r\n\r\n";

const WEBSOCKET_TEXT_FRAME: &[u8] = &[0x81, 0x05, b'h', b'e', b'l', b'l', b'o'];

const JSON_MESSAGE: &[u8] = br#"{"event":"login","user":"alice","session_id":"abc123"}"#;

fn bench_http_boundary_detection(c: &mut Criterion) {
    c.bench_function("detect_http_boundary", |b| {
        b.iter(|| {
            let mut detectors = DetectorRegistry::with_defaults().spawn_detectors();
            let (_, detector) = &mut detectors[0];
            detector.detect(std::hint::black_box(HTTP_REQUEST))
        });
    });
}

fn bench_websocket_boundary_detection(c: &mut Criterion) {
    c.bench_function("detect_websocket_boundary", |b| {
        b.iter(|| {
            let mut detectors = DetectorRegistry::with_defaults().spawn_detectors();
            let (_, detector) = &mut detectors[1];
            detector.detect(std::hint::black_box(WEBSOCKET_TEXT_FRAME))
        });
    });
}

fn bench_http_dissect(c: &mut Criterion) {
    let dissector = dissect::for_protocol(Protocol::Http);

    c.bench_function("dissect_http_request", |b| {
        b.iter(|| dissector.dissect(std::hint::black_box(HTTP_REQUEST)));
    });
}

fn bench_json_dissect_and_scan_sensitive(c: &mut Criterion) {
    let dissector = dissect::for_protocol(Protocol::Json);
    let frame = dissector.dissect(JSON_MESSAGE).expect("fixture must dissect cleanly");

    c.bench_function("json_find_sensitive", |b| {
        b.iter(|| dissector.find_sensitive(std::hint::black_box(&frame)));
    });
}

criterion_group!(
    scanner_benches,
    bench_http_boundary_detection,
    bench_websocket_boundary_detection,
    bench_http_dissect,
    bench_json_dissect_and_scan_sensitive,
);
criterion_main!(scanner_benches);
