use crate::record::{Sample, RECORD_SIZE};
use crate::sink::{DeliverySink, DiagnosticKind, ReaderEvent};
use crate::source::{ReadOutcome, SampleSource, SourceError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on how long the worker may go without checking the stop signal.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReaderState {
    Idle,
    Opening,
    Reading,
    Stopped,
}

/// What ends a session besides a stop request or a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Long-running display: timeouts are ignored.
    Continuous,
    /// Verification: succeed on the first alert-flagged sample, fail once
    /// `within` has elapsed without one.
    UntilAlert { within: Duration },
}

#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Readiness wait handed to each `read_one` call.
    pub poll_interval: Duration,
    /// Pause after a zero-byte read.
    pub idle_backoff: Duration,
    /// How long `Opening` keeps retrying a source that does not exist yet.
    pub open_wait: Duration,
    pub termination: Termination,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            idle_backoff: Duration::from_millis(100),
            open_wait: Duration::ZERO,
            termination: Termination::Continuous,
        }
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    pub open_attempts: u64,
    pub samples_delivered: u64,
    pub alerts_seen: u64,
    pub partial_reads: u64,
    pub idle_reads: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The stop signal was raised.
    Stopped,
    /// Verification succeeded with this sample.
    AlertObserved(Sample),
    /// Verification bound exhausted without an alert-flagged sample.
    NoAlertWithinBound { waited: Duration },
    /// Transport failure; already delivered once as `Fatal`.
    SourceFailed(SourceError),
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub stats: ReaderStats,
}

/// Idempotent cross-thread stop request.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives one source through one session. Consumed by [`SampleReader::run`]:
/// reopening needs a new reader.
pub struct SampleReader<S: SampleSource, K: DeliverySink> {
    source: S,
    sink: K,
    config: ReaderConfig,
    state: ReaderState,
    stats: ReaderStats,
}

impl<S: SampleSource, K: DeliverySink> SampleReader<S, K> {
    pub fn new(source: S, sink: K, mut config: ReaderConfig) -> Self {
        config.poll_interval = config
            .poll_interval
            .clamp(Duration::from_millis(1), MAX_POLL_INTERVAL);
        Self {
            source,
            sink,
            config,
            state: ReaderState::Idle,
            stats: ReaderStats::default(),
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn run(mut self, stop: &StopSignal) -> SessionReport {
        let outcome = self.run_session(stop);
        self.source.close();
        self.transition(ReaderState::Stopped);

        info!(
            source = %self.source.describe(),
            outcome = ?outcome,
            samples = self.stats.samples_delivered,
            alerts = self.stats.alerts_seen,
            partial_reads = self.stats.partial_reads,
            "Reader session finished"
        );

        SessionReport {
            outcome,
            stats: self.stats,
        }
    }

    fn run_session(&mut self, stop: &StopSignal) -> SessionOutcome {
        self.transition(ReaderState::Opening);
        match self.open_source(stop) {
            Ok(true) => {}
            Ok(false) => return SessionOutcome::Stopped,
            Err(reason) => return self.fail(reason),
        }

        self.transition(ReaderState::Reading);
        let started = Instant::now();
        let verifying = matches!(self.config.termination, Termination::UntilAlert { .. });
        // A bound too large for `Instant` is no bound at all.
        let deadline = match self.config.termination {
            Termination::Continuous => None,
            Termination::UntilAlert { within } => started.checked_add(within),
        };

        loop {
            if stop.is_stopped() {
                return SessionOutcome::Stopped;
            }

            let wait = match remaining(deadline) {
                Some(left) if left.is_zero() => {
                    return SessionOutcome::NoAlertWithinBound {
                        waited: started.elapsed(),
                    }
                }
                Some(left) => left.min(self.config.poll_interval),
                None => self.config.poll_interval,
            };

            let outcome = self.source.read_one(wait);
            // Nothing reaches the sink once stop has been observed.
            if stop.is_stopped() {
                return SessionOutcome::Stopped;
            }

            match outcome {
                ReadOutcome::Decoded(sample) => {
                    self.stats.samples_delivered += 1;
                    if sample.is_alert() {
                        self.stats.alerts_seen += 1;
                    }
                    self.sink.deliver(ReaderEvent::Sample(sample));
                    if verifying && sample.is_alert() {
                        return SessionOutcome::AlertObserved(sample);
                    }
                }
                ReadOutcome::Empty => {
                    self.stats.idle_reads += 1;
                    let backoff = self.config.idle_backoff.min(self.config.poll_interval);
                    thread::sleep(remaining(deadline).map_or(backoff, |left| left.min(backoff)));
                }
                ReadOutcome::Partial(len) => {
                    self.stats.partial_reads += 1;
                    warn!(len, expected = RECORD_SIZE, "Short read, record discarded");
                    self.sink.deliver(ReaderEvent::Diagnostic {
                        kind: DiagnosticKind::PartialRecord,
                        detail: format!("read {len} of {RECORD_SIZE} bytes, record discarded"),
                    });
                }
                ReadOutcome::TimedOut => {
                    // Bounded sessions end at the top of the loop once the deadline passes.
                    self.stats.timeouts += 1;
                }
                ReadOutcome::SourceUnavailable(reason) => return self.fail(reason),
            }
        }
    }

    /// `Ok(false)` when stop was requested while waiting for the source to appear.
    fn open_source(&mut self, stop: &StopSignal) -> Result<bool, SourceError> {
        let started = Instant::now();
        loop {
            if stop.is_stopped() {
                return Ok(false);
            }
            self.stats.open_attempts += 1;
            match self.source.open() {
                Ok(()) => {
                    info!(source = %self.source.describe(), "Source opened");
                    return Ok(true);
                }
                Err(SourceError::NotFound { path })
                    if started.elapsed() < self.config.open_wait =>
                {
                    debug!(path = %path.display(), "Source not present yet, waiting");
                    let left = self.config.open_wait.saturating_sub(started.elapsed());
                    thread::sleep(left.min(self.config.poll_interval));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn fail(&mut self, reason: SourceError) -> SessionOutcome {
        error!(
            source = %self.source.describe(),
            error = %reason,
            "Source unavailable, stopping reader"
        );
        self.sink.deliver(ReaderEvent::Fatal {
            reason: reason.clone(),
        });
        SessionOutcome::SourceFailed(reason)
    }

    fn transition(&mut self, next: ReaderState) {
        debug!(from = ?self.state, to = ?next, "Reader state change");
        self.state = next;
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}
