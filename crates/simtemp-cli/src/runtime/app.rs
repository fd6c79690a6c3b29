use crate::infra::event_log::{EventKind, EventLog};
use crate::output::{format_diagnostic, format_sample_line, format_summary};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use simtemp_core::{
    ChannelSink, ReadOutcome, ReaderEvent, ReaderSession, SampleHistory, SampleSource,
    SessionOutcome, SourceError, SyntheticSource, TimeBase,
};
use simtemp_io::sysfs::{AttributeError, SysfsAttributes};
use simtemp_io::DeviceSource;
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const EXIT_VERIFY_FAILED: u8 = 1;
const EXIT_ERROR: u8 = 2;

const CONSUMER_TICK: Duration = Duration::from_millis(200);

enum SimtempSource {
    Synthetic(SyntheticSource),
    Device(DeviceSource),
}

impl SampleSource for SimtempSource {
    fn open(&mut self) -> Result<(), SourceError> {
        match self {
            Self::Synthetic(s) => s.open(),
            Self::Device(s) => s.open(),
        }
    }

    fn read_one(&mut self, wait: Duration) -> ReadOutcome {
        match self {
            Self::Synthetic(s) => s.read_one(wait),
            Self::Device(s) => s.read_one(wait),
        }
    }

    fn close(&mut self) {
        match self {
            Self::Synthetic(s) => s.close(),
            Self::Device(s) => s.close(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Synthetic(s) => s.describe(),
            Self::Device(s) => s.describe(),
        }
    }
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("simtemp: {e}");
            eprintln!("Try 'simtemp --help' for more information.");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    if config.show_config {
        return show_config(&config);
    }
    if config.apply_config {
        return apply_config(&config);
    }

    let source = if config.simulate {
        SimtempSource::Synthetic(SyntheticSource::new(config.sim_config()))
    } else {
        if let Err(code) = program_device(&config) {
            return code;
        }
        SimtempSource::Device(DeviceSource::new(&config.device_path))
    };

    let event_log = match config.event_log.as_deref().map(open_event_log).transpose() {
        Ok(log) => log,
        Err(code) => return code,
    };

    read_samples(&config, source, event_log.as_ref())
}

fn read_samples(
    config: &RuntimeConfig,
    source: SimtempSource,
    event_log: Option<&EventLog>,
) -> ExitCode {
    let timebase = TimeBase::new();
    let description = source.describe();

    let (sink, rx) = ChannelSink::bounded(config.queue_capacity);
    let dropped = sink.drop_counter();
    let session = match ReaderSession::spawn(source, sink, config.reader_config()) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("simtemp: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let stop = session.stop_signal();
    if let Err(e) = ctrlc::set_handler(move || stop.stop()) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    if let Some(log) = event_log {
        let details = serde_json::json!({
            "source": description,
            "test_mode": config.test_mode,
            "version": env!("CARGO_PKG_VERSION"),
        });
        if let Err(e) = log.log_event(&timebase, EventKind::SessionStart, details) {
            warn!(error = %e, "Failed to write event log");
        }
    }

    // A duration past what `Instant` can hold runs until interrupted.
    let deadline = config
        .run_seconds
        .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)));
    if let Some(secs) = config.run_seconds {
        info!(seconds = secs, "Running for limited duration");
    }

    let mut history = config.history.map(SampleHistory::new);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut output_error: Option<io::Error> = None;

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            session.stop();
        }

        let event = match rx.recv_timeout(CONSUMER_TICK) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                telemetry::sync_sink_drops(&dropped);
                continue;
            }
            // The reader dropped its sink: session over and queue drained.
            Err(RecvTimeoutError::Disconnected) => break,
        };

        telemetry::observe(&event);
        if let Some(log) = event_log {
            if let Err(e) = log.record(&timebase, &event) {
                warn!(error = %e, "Failed to write event log");
            }
        }

        match event {
            ReaderEvent::Sample(sample) => {
                if let Some(history) = history.as_mut() {
                    history.push(sample);
                }
                if output_error.is_some() {
                    continue;
                }
                if let Err(e) = write_line(&mut out, &format_sample_line(&sample)) {
                    // Keep draining until the reader lets go of its sink.
                    session.stop();
                    output_error = Some(e);
                }
            }
            ReaderEvent::Diagnostic { kind, detail } => {
                eprintln!("{}", format_diagnostic(kind, &detail));
            }
            ReaderEvent::Fatal { reason } => {
                eprintln!("simtemp: {reason}");
            }
        }
    }

    let report = match session.join() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("simtemp: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let drops = telemetry::sync_sink_drops(&dropped);

    info!(
        samples = report.stats.samples_delivered,
        alerts = report.stats.alerts_seen,
        partial_reads = report.stats.partial_reads,
        idle_reads = report.stats.idle_reads,
        timeouts = report.stats.timeouts,
        dropped_events = drops,
        "Run complete"
    );

    if let Some(summary) = history.as_ref().and_then(SampleHistory::summary) {
        let _ = write_line(&mut out, &format_summary(&summary));
    }

    if let Some(log) = event_log {
        let details = serde_json::json!({
            "outcome": outcome_label(&report.outcome),
            "stats": report.stats,
            "dropped_events": drops,
        });
        if let Err(e) = log.log_event(&timebase, EventKind::SessionEnd, details) {
            warn!(error = %e, "Failed to write event log");
        }
    }

    if let Some(e) = output_error {
        if e.kind() != ErrorKind::BrokenPipe {
            eprintln!("simtemp: failed to write output: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
        // A closed pipe is a normal end unless the source had already failed.
        info!("Stdout closed, stopped reading");
        if !matches!(report.outcome, SessionOutcome::SourceFailed(_)) {
            return ExitCode::SUCCESS;
        }
    }

    exit_code(config.test_mode, &report.outcome, &mut out)
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<()> {
    writeln!(out, "{line}")?;
    out.flush()
}

fn exit_code(test_mode: bool, outcome: &SessionOutcome, out: &mut impl Write) -> ExitCode {
    match (test_mode, outcome) {
        (_, SessionOutcome::SourceFailed(reason)) => {
            if test_mode {
                eprintln!("TEST: source failed: {reason}");
            }
            ExitCode::from(EXIT_ERROR)
        }
        (true, SessionOutcome::AlertObserved(_)) => {
            let _ = write_line(out, "TEST: alert observed");
            ExitCode::SUCCESS
        }
        (true, SessionOutcome::NoAlertWithinBound { waited }) => {
            info!(waited_ms = waited.as_millis() as u64, "No alert within bound");
            let _ = write_line(out, "TEST: alert not observed");
            ExitCode::from(EXIT_VERIFY_FAILED)
        }
        (true, SessionOutcome::Stopped) => {
            let _ = write_line(out, "TEST: interrupted");
            ExitCode::from(EXIT_VERIFY_FAILED)
        }
        (false, _) => ExitCode::SUCCESS,
    }
}

fn outcome_label(outcome: &SessionOutcome) -> &'static str {
    match outcome {
        SessionOutcome::Stopped => "stopped",
        SessionOutcome::AlertObserved(_) => "alert_observed",
        SessionOutcome::NoAlertWithinBound { .. } => "no_alert_within_bound",
        SessionOutcome::SourceFailed(_) => "source_failed",
    }
}

fn open_event_log(path: &Path) -> Result<EventLog, ExitCode> {
    EventLog::new(path)
        .inspect(|_| info!(path = %path.display(), "Event logging enabled"))
        .map_err(|e| {
            eprintln!("simtemp: cannot open event log {}: {e}", path.display());
            ExitCode::from(EXIT_ERROR)
        })
}

fn attributes(config: &RuntimeConfig) -> Result<SysfsAttributes, AttributeError> {
    match &config.sysfs_path {
        Some(path) => SysfsAttributes::discover_from(&[path]),
        None => SysfsAttributes::discover(),
    }
}

/// Writes the verification profile before `--test`, or any explicit
/// overrides before a plain read.
fn program_device(config: &RuntimeConfig) -> Result<(), ExitCode> {
    if !config.test_mode && !config.has_overrides() {
        return Ok(());
    }

    let result = attributes(config).and_then(|attrs| {
        let target = if config.test_mode {
            config.sim_config()
        } else {
            config.with_overrides(attrs.load()?)
        };
        attrs.apply(&target)
    });

    result.map_err(|e| {
        if config.test_mode {
            eprintln!("TEST: failed to program device attributes: {e}");
        } else {
            eprintln!("simtemp: {e}");
        }
        ExitCode::from(EXIT_ERROR)
    })
}

fn show_config(config: &RuntimeConfig) -> ExitCode {
    if config.simulate {
        let sim = config.sim_config();
        println!("source: synthetic");
        println!("sampling_ms={}", sim.sampling_ms);
        println!("threshold_mC={}", sim.threshold_mc);
        println!("mode={}", sim.mode);
        return ExitCode::SUCCESS;
    }

    let attrs = match attributes(config) {
        Ok(attrs) => attrs,
        Err(e) => {
            eprintln!("simtemp: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let current = match attrs.load() {
        Ok(current) => current,
        Err(e) => {
            eprintln!("simtemp: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    println!("sysfs: {}", attrs.base().display());
    println!("sampling_ms={}", current.sampling_ms);
    println!("threshold_mC={}", current.threshold_mc);
    println!("mode={}", current.mode);
    match attrs.stats() {
        Ok(stats) => println!("stats: {stats}"),
        Err(e) => {
            warn!(error = %e, "Driver stats unavailable");
            println!("stats: unavailable");
        }
    }
    ExitCode::SUCCESS
}

fn apply_config(config: &RuntimeConfig) -> ExitCode {
    let result = attributes(config).and_then(|attrs| {
        let target = config.with_overrides(attrs.load()?);
        attrs.apply(&target).map(|()| target)
    });

    match result {
        Ok(applied) => {
            println!(
                "applied: sampling_ms={} threshold_mC={} mode={}",
                applied.sampling_ms, applied.threshold_mc, applied.mode
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("simtemp: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
