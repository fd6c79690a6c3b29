use chrono::{DateTime, Utc};
use simtemp_core::history::HistorySummary;
use simtemp_core::record::Sample;
use simtemp_core::sink::DiagnosticKind;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// `2023-11-14T22:13:20.123Z`: UTC, millisecond precision.
pub fn format_timestamp(timestamp_ns: u64) -> String {
    let secs = (timestamp_ns / NANOS_PER_SEC) as i64;
    let nanos = (timestamp_ns % NANOS_PER_SEC) as u32;
    match DateTime::<Utc>::from_timestamp(secs, nanos) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => format!("{timestamp_ns}ns"),
    }
}

pub fn format_sample_line(sample: &Sample) -> String {
    format!(
        "{} temp={:.3}C alert={}",
        format_timestamp(sample.timestamp_ns()),
        sample.temperature_c(),
        sample.is_alert()
    )
}

pub fn format_diagnostic(kind: DiagnosticKind, detail: &str) -> String {
    format!("diagnostic: {} ({detail})", kind.as_str())
}

pub fn format_summary(summary: &HistorySummary) -> String {
    format!(
        "history: count={} min={:.3}C max={:.3}C mean={:.3}C alerts={}",
        summary.count,
        f64::from(summary.min_mc) / 1000.0,
        f64::from(summary.max_mc) / 1000.0,
        summary.mean_mc / 1000.0,
        summary.alerts
    )
}
