use std::sync::{Arc, Mutex};

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tracing::warn;

use crate::finding::{Finding, Severity};

/// Counters and latency histograms for one engine instance.
///
/// One struct of pre-built `Counter`/`Histogram` instruments, built once
/// from a `Meter` with `with_description`, read and incremented without any
/// business logic living in this module. No Prometheus exporter or HTTP
/// endpoint is built here — persistence and report rendering live outside
/// this crate; a caller that wants an exporter can pull the
/// `SdkMeterProvider` via [`Sink::meter_provider`] and wire whatever it
/// likes.
pub struct Sink {
    meter_provider: SdkMeterProvider,

    pub written_bytes: Counter<u64>,
    pub write_dropped: Counter<u64>,
    pub event_dropped: Counter<u64>,
    pub events_sent: Counter<u64>,
    pub scans: Counter<u64>,
    pub parse_errors: Counter<u64>,
    pub protocol_detected: Counter<u64>,
    pub protocol_bytes: Counter<u64>,
    pub scan_duration_seconds: Histogram<f64>,
    pub dissect_duration_seconds: Histogram<f64>,

    findings_total: Counter<u64>,
    on_finding: Mutex<Vec<Box<dyn Fn(&Finding) + Send + Sync>>>,
}

impl Sink {
    fn new(meter: Meter, meter_provider: SdkMeterProvider) -> Self {
        Self {
            meter_provider,
            written_bytes: meter
                .u64_counter("protoscan_written_bytes_total")
                .with_description("Total bytes accepted by ring buffer writes")
                .build(),
            write_dropped: meter
                .u64_counter("protoscan_write_dropped_total")
                .with_description("Writes rejected with BufferFull")
                .build(),
            event_dropped: meter
                .u64_counter("protoscan_event_dropped_total")
                .with_description("ProtocolEvents that could not be enqueued downstream")
                .build(),
            events_sent: meter
                .u64_counter("protoscan_events_sent_total")
                .with_description("ProtocolEvents successfully delivered to a consumer")
                .build(),
            scans: meter
                .u64_counter("protoscan_scans_total")
                .with_description("Scanner iterations performed")
                .build(),
            parse_errors: meter
                .u64_counter("protoscan_parse_errors_total")
                .with_description("Hard parse failures that triggered byte-level resync")
                .build(),
            protocol_detected: meter
                .u64_counter("protoscan_protocol_detected_total")
                .with_description("Messages detected per protocol")
                .build(),
            protocol_bytes: meter
                .u64_counter("protoscan_protocol_bytes_total")
                .with_description("Bytes attributed to each protocol")
                .build(),
            scan_duration_seconds: meter
                .f64_histogram("protoscan_scan_duration_seconds")
                .with_description("Wall time spent per scanner iteration")
                .build(),
            dissect_duration_seconds: meter
                .f64_histogram("protoscan_dissect_duration_seconds")
                .with_description("Wall time spent dissecting one recovered frame")
                .build(),
            findings_total: meter
                .u64_counter("protoscan_findings_total")
                .with_description("Findings emitted, by kind and severity")
                .build(),
            on_finding: Mutex::new(Vec::new()),
        }
    }

    /// Build a fresh sink with its own in-process `Meter`. No exporter is
    /// attached; see [`Sink::meter_provider`].
    pub fn init() -> Arc<Self> {
        let meter_provider = SdkMeterProvider::builder().build();
        let meter = meter_provider.meter("protoscan-core");
        Arc::new(Self::new(meter, meter_provider))
    }

    /// The underlying meter provider, for a caller that wants to attach its
    /// own exporter (Prometheus, OTLP, stdout, …). Kept outside the core on
    /// purpose: wiring an exporter is the report-rendering/transport layer,
    /// not this pipeline.
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    /// Register a callback invoked for every finding recorded via
    /// [`Sink::record_finding`]. Callbacks run in registration order.
    pub fn on_finding<F>(&self, callback: F)
    where
        F: Fn(&Finding) + Send + Sync + 'static,
    {
        self.on_finding.lock().expect("on_finding lock poisoned").push(Box::new(callback));
    }

    /// Count a finding and fan it out to every registered callback. Findings
    /// are never retained by the sink itself.
    pub fn record_finding(&self, finding: &Finding) {
        self.findings_total.add(
            1,
            &[
                KeyValue::new("kind", finding.kind.clone()),
                KeyValue::new("severity", finding.severity.as_str()),
            ],
        );
        if matches!(finding.severity, Severity::High | Severity::Critical) {
            warn!(kind = %finding.kind, severity = finding.severity.as_str(), "finding recorded");
        }
        let callbacks = self.on_finding.lock().expect("on_finding lock poisoned");
        for callback in callbacks.iter() {
            callback(finding);
        }
    }

    pub fn record_protocol_detected(&self, protocol: &str, bytes: u64) {
        let attrs = [KeyValue::new("protocol", protocol.to_string())];
        self.protocol_detected.add(1, &attrs);
        self.protocol_bytes.add(bytes, &attrs);
    }

    pub fn record_parse_error(&self, protocol: &str) {
        self.parse_errors.add(1, &[KeyValue::new("protocol", protocol.to_string())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn finding_callbacks_fire_in_registration_order() {
        let sink = Sink::init();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        sink.on_finding(move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        sink.on_finding(move |_| o2.lock().unwrap().push(2));

        sink.record_finding(&Finding {
            kind: "weak_session_id".into(),
            severity: Severity::Low,
            confidence: 0.8,
            evidence: "evidence".into(),
            frame_refs: vec![],
            description: "desc".into(),
        });

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn protocol_counters_do_not_panic_across_many_protocols() {
        let sink = Sink::init();
        let seen = Arc::new(AtomicUsize::new(0));
        for protocol in ["http", "websocket", "grpc", "json"] {
            sink.record_protocol_detected(protocol, 128);
            seen.fetch_add(1, Ordering::Relaxed);
        }
        assert_eq!(seen.load(Ordering::Relaxed), 4);
    }
}
