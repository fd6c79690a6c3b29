use simtemp_core::sink::ReaderEvent;
use simtemp_io::metrics::{init_metrics, record_event, record_sink_drops, serve_metrics};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

pub fn observe(event: &ReaderEvent) {
    record_event(event);
}

/// Mirrors the delivery queue's drop counter into the exported gauge.
pub fn sync_sink_drops(dropped: &AtomicU64) -> u64 {
    let count = dropped.load(Ordering::Relaxed);
    record_sink_drops(count);
    count
}
