//! Prometheus metrics for the sample reader.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use simtemp_core::sink::ReaderEvent;
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Header, Response, Server};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Stream Metrics
// ============================================================================

pub static SAMPLES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("simtemp_samples_total", "Decoded samples delivered").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static ALERT_SAMPLES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "simtemp_alert_samples_total",
        "Delivered samples carrying the alert flag",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static PARTIAL_READS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "simtemp_partial_reads_total",
        "Short reads discarded as partial records",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static SOURCE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "simtemp_source_failures_total",
        "Reader sessions ended by a transport failure",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Events dropped by a full delivery queue (cumulative, mirrored from the sink)
pub static SINK_DROPPED_EVENTS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        "simtemp_sink_dropped_events",
        "Events dropped because the delivery queue was full",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Temperature Metrics
// ============================================================================

pub static TEMPERATURE_C: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new("simtemp_temperature_celsius", "Latest sampled temperature").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static TEMPERATURE_HIST_C: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "simtemp_temperature_distribution_celsius",
            "Sampled temperature distribution",
        )
        .buckets(vec![20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0]),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

/// Updates counters from one delivered event.
pub fn record_event(event: &ReaderEvent) {
    match event {
        ReaderEvent::Sample(sample) => {
            SAMPLES_TOTAL.inc();
            if sample.is_alert() {
                ALERT_SAMPLES_TOTAL.inc();
            }
            TEMPERATURE_C.set(sample.temperature_c());
            TEMPERATURE_HIST_C.observe(sample.temperature_c());
        }
        ReaderEvent::Diagnostic { .. } => PARTIAL_READS_TOTAL.inc(),
        ReaderEvent::Fatal { .. } => SOURCE_FAILURES_TOTAL.inc(),
    }
}

pub fn record_sink_drops(dropped: u64) {
    SINK_DROPPED_EVENTS.set(i64::try_from(dropped).unwrap_or(i64::MAX));
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Serves `/metrics`, `/health` and `/ready` on `bind_addr` from a background thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(addr = %bind_addr, error = %e, "Failed to start metrics server");
                return;
            }
        };

        tracing::info!(addr = %bind_addr, "Metrics server listening");

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => match render() {
                    Ok(buffer) => {
                        let mut response = Response::from_data(buffer);
                        if let Ok(header) = Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            response = response.with_header(header);
                        }
                        response
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode metrics");
                        Response::from_string("Internal Server Error").with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                // Ready once the first sample has arrived
                "/ready" if SAMPLES_TOTAL.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

fn render() -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Forces registration so every series is exported from the first scrape.
pub fn init_metrics() {
    let _ = SAMPLES_TOTAL.get();
    let _ = ALERT_SAMPLES_TOTAL.get();
    let _ = PARTIAL_READS_TOTAL.get();
    let _ = SOURCE_FAILURES_TOTAL.get();
    let _ = SINK_DROPPED_EVENTS.get();
    let _ = TEMPERATURE_C.get();
    let _ = TEMPERATURE_HIST_C.get_sample_count();
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtemp_core::record::{Sample, FLAG_ALERT, FLAG_NEW_SAMPLE};
    use simtemp_core::sink::DiagnosticKind;

    #[test]
    fn events_update_counters() {
        init_metrics();
        let samples = SAMPLES_TOTAL.get();
        let alerts = ALERT_SAMPLES_TOTAL.get();
        let partial = PARTIAL_READS_TOTAL.get();

        record_event(&ReaderEvent::Sample(Sample::new(
            0,
            36_000,
            FLAG_NEW_SAMPLE | FLAG_ALERT,
        )));
        record_event(&ReaderEvent::Diagnostic {
            kind: DiagnosticKind::PartialRecord,
            detail: "read 5 of 16 bytes".to_string(),
        });

        assert!(SAMPLES_TOTAL.get() > samples);
        assert!(ALERT_SAMPLES_TOTAL.get() > alerts);
        assert!(PARTIAL_READS_TOTAL.get() > partial);
    }

    #[test]
    fn exposition_names_every_series() {
        init_metrics();
        record_sink_drops(4);
        let text = String::from_utf8(render().unwrap()).unwrap();
        for name in [
            "simtemp_samples_total",
            "simtemp_alert_samples_total",
            "simtemp_partial_reads_total",
            "simtemp_source_failures_total",
            "simtemp_sink_dropped_events",
            "simtemp_temperature_celsius",
            "simtemp_temperature_distribution_celsius",
        ] {
            assert!(text.contains(name), "missing {name}");
        }
    }
}
