use crate::record::{encode, Sample, FLAG_ALERT, FLAG_NEW_SAMPLE};
use crate::source::{ReadOutcome, SampleSource, SourceError};
use crate::timebase::TimeBase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const NORMAL_BASE_MC: i32 = 30_000;
const NORMAL_RANGE: u64 = 20_000;

const RAMP_BASE_MC: i32 = 25_000;
const RAMP_STEP: u64 = 200;
const RAMP_RANGE: u64 = 40_000;

const NOISY_BASE_MC: i32 = 30_000;
const NOISY_PRIME: u64 = 37;
const NOISY_SPREAD: u64 = 4_001;

/// Generation policy, named after the driver's `mode` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimMode {
    /// Steady climb: `base + (counter mod range)`.
    #[default]
    Normal,
    /// Sawtooth: `base + ((counter * step) mod range)`.
    Ramp,
    /// Bounded walk: `base + ((counter * prime) mod spread) - spread / 2`.
    Noisy,
}

impl SimMode {
    pub const ALL: [SimMode; 3] = [SimMode::Normal, SimMode::Ramp, SimMode::Noisy];

    pub fn as_str(&self) -> &'static str {
        match self {
            SimMode::Normal => "normal",
            SimMode::Ramp => "ramp",
            SimMode::Noisy => "noisy",
        }
    }

    /// Temperature in milli-degrees Celsius for the given generation counter.
    pub fn temperature_at(&self, counter: u64) -> i32 {
        // Every offset is strictly below its range, so the narrowing casts are lossless.
        match self {
            SimMode::Normal => NORMAL_BASE_MC + (counter % NORMAL_RANGE) as i32,
            SimMode::Ramp => RAMP_BASE_MC + (counter.wrapping_mul(RAMP_STEP) % RAMP_RANGE) as i32,
            SimMode::Noisy => {
                NOISY_BASE_MC + (counter.wrapping_mul(NOISY_PRIME) % NOISY_SPREAD) as i32
                    - (NOISY_SPREAD / 2) as i32
            }
        }
    }

    /// Number of records in one ramp sawtooth period.
    pub const fn ramp_period() -> u64 {
        RAMP_RANGE / RAMP_STEP
    }
}

impl fmt::Display for SimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode {0:?} (expected one of normal, ramp, noisy)")]
pub struct ParseModeError(pub String);

impl FromStr for SimMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The numeric forms are the driver's internal mode indices.
        match s.trim() {
            "normal" | "0" => Ok(SimMode::Normal),
            "ramp" | "1" => Ok(SimMode::Ramp),
            "noisy" | "2" => Ok(SimMode::Noisy),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// The three side-channel attributes, used as construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    pub sampling_ms: u32,
    pub threshold_mc: i32,
    pub mode: SimMode,
}

impl SimConfig {
    /// Profile programmed by verification runs: fast ramp that crosses 26 °C quickly.
    pub const fn verification() -> Self {
        Self {
            sampling_ms: 100,
            threshold_mc: 26_000,
            mode: SimMode::Ramp,
        }
    }

    pub fn sampling(&self) -> Duration {
        Duration::from_millis(u64::from(self.sampling_ms.max(1)))
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sampling_ms: 1_000,
            threshold_mc: 45_000,
            mode: SimMode::Normal,
        }
    }
}

/// In-process stand-in for the character device.
///
/// Records are produced on the configured cadence, encoded, and re-framed
/// exactly like bytes read from the device.
#[derive(Debug)]
pub struct SyntheticSource {
    config: SimConfig,
    timebase: TimeBase,
    counter: u64,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            timebase: TimeBase::new(),
            counter: 0,
            next_due: None,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Records generated since the last `open`.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn generate(&mut self) -> Sample {
        let temperature_mc = self.config.mode.temperature_at(self.counter);
        self.counter += 1;

        let mut flags = FLAG_NEW_SAMPLE;
        if temperature_mc >= self.config.threshold_mc {
            flags |= FLAG_ALERT;
        }
        Sample::new(self.timebase.unix_ns(), temperature_mc, flags)
    }
}

impl SampleSource for SyntheticSource {
    fn open(&mut self) -> Result<(), SourceError> {
        self.counter = 0;
        self.next_due = Some(Instant::now());
        Ok(())
    }

    fn read_one(&mut self, wait: Duration) -> ReadOutcome {
        let Some(due) = self.next_due else {
            return ReadOutcome::SourceUnavailable(SourceError::NotOpen);
        };

        let now = Instant::now();
        if due > now {
            let remaining = due - now;
            if remaining > wait {
                thread::sleep(wait);
                return ReadOutcome::TimedOut;
            }
            thread::sleep(remaining);
        }

        let sample = self.generate();
        // A late reader resumes the cadence from now instead of bursting.
        self.next_due = Some(due.max(Instant::now()) + self.config.sampling());
        ReadOutcome::from_read(&encode(&sample))
    }

    fn close(&mut self) {
        self.next_due = None;
    }

    fn describe(&self) -> String {
        format!(
            "synthetic(mode={}, sampling_ms={}, threshold_mC={})",
            self.config.mode, self.config.sampling_ms, self.config.threshold_mc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(outcome: ReadOutcome) -> Sample {
        match outcome {
            ReadOutcome::Decoded(sample) => sample,
            other => panic!("expected a decoded sample, got {other:?}"),
        }
    }

    #[test]
    fn waveforms_match_driver_formulas() {
        assert_eq!(SimMode::Normal.temperature_at(0), 30_000);
        assert_eq!(SimMode::Normal.temperature_at(5), 30_005);
        assert_eq!(SimMode::Normal.temperature_at(20_000), 30_000);

        assert_eq!(SimMode::Ramp.temperature_at(0), 25_000);
        assert_eq!(SimMode::Ramp.temperature_at(1), 25_200);
        assert_eq!(SimMode::Ramp.temperature_at(199), 64_800);
        assert_eq!(SimMode::Ramp.temperature_at(200), 25_000);

        assert_eq!(SimMode::Noisy.temperature_at(0), 28_000);
        assert_eq!(SimMode::Noisy.temperature_at(1), 28_037);
    }

    #[test]
    fn parses_mode_names_and_indices() {
        for mode in SimMode::ALL {
            assert_eq!(mode.as_str().parse::<SimMode>(), Ok(mode));
        }
        assert_eq!("1".parse::<SimMode>(), Ok(SimMode::Ramp));
        assert_eq!(" noisy\n".parse::<SimMode>(), Ok(SimMode::Noisy));
        assert!("turbo".parse::<SimMode>().is_err());
    }

    #[test]
    fn unopened_source_is_unavailable() {
        let mut source = SyntheticSource::new(SimConfig::default());
        assert_eq!(
            source.read_one(Duration::from_millis(1)),
            ReadOutcome::SourceUnavailable(SourceError::NotOpen)
        );
    }

    #[test]
    fn first_record_is_immediate_and_flagged_new() {
        let mut source = SyntheticSource::new(SimConfig::default());
        source.open().unwrap();
        let sample = decoded(source.read_one(Duration::from_millis(10)));
        assert!(sample.is_new());
        assert!(!sample.is_alert());
        assert_eq!(sample.temperature_mc(), 30_000);
    }

    #[test]
    fn waits_longer_than_bound_time_out() {
        let mut source = SyntheticSource::new(SimConfig {
            sampling_ms: 1_000,
            ..SimConfig::default()
        });
        source.open().unwrap();
        decoded(source.read_one(Duration::from_millis(10)));

        let started = Instant::now();
        assert_eq!(
            source.read_one(Duration::from_millis(20)),
            ReadOutcome::TimedOut
        );
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn alert_flag_follows_threshold() {
        let mut source = SyntheticSource::new(SimConfig {
            sampling_ms: 1,
            threshold_mc: 25_400,
            mode: SimMode::Ramp,
        });
        source.open().unwrap();
        let alerts: Vec<bool> = (0..4)
            .map(|_| decoded(source.read_one(Duration::from_millis(50))).is_alert())
            .collect();
        assert_eq!(alerts, vec![false, false, true, true]);
    }

    #[test]
    fn counter_runs_while_open_and_restarts_on_open() {
        let mut source = SyntheticSource::new(SimConfig {
            sampling_ms: 1,
            ..SimConfig::default()
        });
        source.open().unwrap();
        for _ in 0..3 {
            decoded(source.read_one(Duration::from_millis(50)));
        }
        assert_eq!(source.counter(), 3);

        source.close();
        assert_eq!(
            source.read_one(Duration::from_millis(1)),
            ReadOutcome::SourceUnavailable(SourceError::NotOpen)
        );

        source.open().unwrap();
        assert_eq!(source.counter(), 0);
        assert_eq!(
            decoded(source.read_one(Duration::from_millis(50))).temperature_mc(),
            30_000
        );
    }
}
