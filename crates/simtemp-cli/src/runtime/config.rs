use simtemp_core::reader::{ReaderConfig, Termination};
use simtemp_core::source_sim::{ParseModeError, SimConfig, SimMode};
use simtemp_io::DEFAULT_DEVICE_PATH;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown option {0}")]
    UnknownOption(String),

    #[error("option {0} requires a value")]
    MissingValue(String),

    #[error("invalid value {value:?} for {option}")]
    InvalidValue { option: String, value: String },

    #[error(transparent)]
    Mode(#[from] ParseModeError),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub device_path: PathBuf,
    /// Explicit attribute directory; discovered when unset.
    pub sysfs_path: Option<PathBuf>,
    pub simulate: bool,
    pub sampling_ms: Option<u32>,
    pub threshold_mc: Option<i32>,
    pub mode: Option<SimMode>,
    pub test_mode: bool,
    pub test_timeout_ms: u64,
    pub run_seconds: Option<u64>,
    pub open_wait_ms: u64,
    pub poll_ms: u64,
    pub history: Option<usize>,
    pub show_config: bool,
    pub apply_config: bool,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub event_log: Option<PathBuf>,
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            sysfs_path: None,
            simulate: false,
            sampling_ms: None,
            threshold_mc: None,
            mode: None,
            test_mode: false,
            test_timeout_ms: 5_000,
            run_seconds: None,
            open_wait_ms: 0,
            poll_ms: 100,
            history: None,
            show_config: false,
            apply_config: false,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            event_log: None,
            queue_capacity: 256,
        }
    }
}

fn value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str, ConfigError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue(option.to_string()))
}

fn parse<T: FromStr>(option: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        option: option.to_string(),
        value: raw.to_string(),
    })
}

fn positive<T: FromStr + Default + PartialOrd>(option: &str, raw: &str) -> Result<T, ConfigError> {
    let parsed: T = parse(option, raw)?;
    if parsed <= T::default() {
        return Err(ConfigError::InvalidValue {
            option: option.to_string(),
            value: raw.to_string(),
        });
    }
    Ok(parsed)
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let option = args[i].as_str();
            match option {
                "--device" => {
                    cfg.device_path = PathBuf::from(value(args, &mut i, option)?);
                }
                "--sysfs" => {
                    cfg.sysfs_path = Some(PathBuf::from(value(args, &mut i, option)?));
                }
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--sampling-ms" => {
                    cfg.sampling_ms = Some(positive(option, value(args, &mut i, option)?)?);
                }
                "--threshold-mc" => {
                    cfg.threshold_mc = Some(parse(option, value(args, &mut i, option)?)?);
                }
                "--mode" => {
                    cfg.mode = Some(value(args, &mut i, option)?.parse()?);
                }
                "--test" => {
                    cfg.test_mode = true;
                }
                "--test-timeout-ms" => {
                    cfg.test_timeout_ms = positive(option, value(args, &mut i, option)?)?;
                }
                "--run-seconds" => {
                    cfg.run_seconds = Some(parse(option, value(args, &mut i, option)?)?);
                }
                "--open-wait-ms" => {
                    cfg.open_wait_ms = parse(option, value(args, &mut i, option)?)?;
                }
                "--poll-ms" => {
                    cfg.poll_ms = positive(option, value(args, &mut i, option)?)?;
                }
                "--history" => {
                    cfg.history = Some(positive(option, value(args, &mut i, option)?)?);
                }
                "--show-config" => {
                    cfg.show_config = true;
                }
                "--apply-config" => {
                    cfg.apply_config = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    cfg.log_dir = Some(PathBuf::from(value(args, &mut i, option)?));
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = Some(value(args, &mut i, option)?.to_string());
                }
                "--event-log" => {
                    cfg.event_log = Some(PathBuf::from(value(args, &mut i, option)?));
                }
                "--queue-capacity" => {
                    cfg.queue_capacity = positive(option, value(args, &mut i, option)?)?;
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
            i += 1;
        }
        Ok(cfg)
    }

    pub fn has_overrides(&self) -> bool {
        self.sampling_ms.is_some() || self.threshold_mc.is_some() || self.mode.is_some()
    }

    /// Applies the command-line attribute overrides on top of `base`.
    pub fn with_overrides(&self, mut base: SimConfig) -> SimConfig {
        if let Some(sampling_ms) = self.sampling_ms {
            base.sampling_ms = sampling_ms;
        }
        if let Some(threshold_mc) = self.threshold_mc {
            base.threshold_mc = threshold_mc;
        }
        if let Some(mode) = self.mode {
            base.mode = mode;
        }
        base
    }

    /// Profile for the synthetic source, or the one programmed before verification.
    pub fn sim_config(&self) -> SimConfig {
        let base = if self.test_mode {
            SimConfig::verification()
        } else {
            SimConfig::default()
        };
        self.with_overrides(base)
    }

    pub fn reader_config(&self) -> ReaderConfig {
        let termination = if self.test_mode {
            Termination::UntilAlert {
                within: Duration::from_millis(self.test_timeout_ms),
            }
        } else {
            Termination::Continuous
        };
        ReaderConfig {
            poll_interval: Duration::from_millis(self.poll_ms),
            open_wait: Duration::from_millis(self.open_wait_ms),
            termination,
            ..ReaderConfig::default()
        }
    }

    pub fn print_help() {
        println!(
            r#"simtemp - reader for the simulated temperature sensor

USAGE:
    simtemp [OPTIONS]

SOURCE:
    --device <PATH>         Character device to read [default: /dev/simtemp]
    --simulate              Use the in-process synthetic source instead of the device
    --open-wait-ms <MS>     Keep retrying a missing device for this long [default: 0]
    --poll-ms <MS>          Readiness wait per poll, at most 500 [default: 100]

DEVICE ATTRIBUTES:
    --sysfs <DIR>           Attribute directory [default: /sys/class/simtemp/simtemp,
                            then /sys/devices/platform/nxp_simtemp]
    --sampling-ms <MS>      Sampling period (positive)
    --threshold-mc <MC>     Alert threshold in milli-degrees Celsius
    --mode <MODE>           Generation mode: normal, ramp or noisy
    --show-config           Print the current attributes and driver stats, then exit
    --apply-config          Write the given attributes, then exit

VERIFICATION:
    --test                  Program a fast ramp and wait for one alert (exit 0 / 1)
    --test-timeout-ms <MS>  How long to wait for the alert [default: 5000]

OUTPUT:
    --run-seconds <SECS>    Stop reading after a fixed duration
    --history <N>           Keep the last N samples and print a summary at exit
    --event-log <PATH>      Append every reader event to a JSONL file
    --queue-capacity <N>    Delivery queue size; a full queue drops events [default: 256]
    --json-logs             Output logs in JSON format
    --log-dir <DIR>         Also write JSON logs to a daily rotating file in DIR
    --metrics-addr <ADDR>   Serve Prometheus metrics on address (e.g., 127.0.0.1:9100)
    -h, --help              Print this help message

EXIT STATUS:
    0   success (verification: alert observed)
    1   verification: no alert within the timeout
    2   usage, device or attribute error

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,simtemp_core=trace)

EXAMPLES:
    # Stream samples from the driver
    simtemp

    # End-to-end check against the driver
    simtemp --test

    # Ten seconds of the noisy generator without hardware
    simtemp --simulate --mode noisy --sampling-ms 200 --run-seconds 10
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("simtemp")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_read_the_device_continuously() {
        let cfg = RuntimeConfig::from_args(&args(&[])).unwrap();
        assert_eq!(cfg.device_path, PathBuf::from("/dev/simtemp"));
        assert!(!cfg.simulate);
        assert_eq!(cfg.sim_config(), SimConfig::default());
        assert_eq!(cfg.reader_config().termination, Termination::Continuous);
        assert_eq!(cfg.reader_config().poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_mode_uses_verification_profile_with_overrides() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--test",
            "--threshold-mc",
            "-2000",
            "--test-timeout-ms",
            "750",
        ]))
        .unwrap();

        let sim = cfg.sim_config();
        assert_eq!(sim.mode, SimMode::Ramp);
        assert_eq!(sim.sampling_ms, 100);
        assert_eq!(sim.threshold_mc, -2_000);
        assert_eq!(
            cfg.reader_config().termination,
            Termination::UntilAlert {
                within: Duration::from_millis(750)
            }
        );
    }

    #[test]
    fn parses_paths_and_switches() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--device",
            "/tmp/dev",
            "--sysfs",
            "/tmp/attrs",
            "--simulate",
            "--mode",
            "noisy",
            "--history",
            "20",
            "--event-log",
            "/tmp/events.jsonl",
            "--metrics-addr",
            "127.0.0.1:9100",
            "--json-logs",
        ]))
        .unwrap();

        assert_eq!(cfg.device_path, PathBuf::from("/tmp/dev"));
        assert_eq!(cfg.sysfs_path, Some(PathBuf::from("/tmp/attrs")));
        assert!(cfg.simulate && cfg.json_logs);
        assert_eq!(cfg.mode, Some(SimMode::Noisy));
        assert_eq!(cfg.history, Some(20));
        assert_eq!(cfg.metrics_addr.as_deref(), Some("127.0.0.1:9100"));
        assert!(cfg.has_overrides());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            RuntimeConfig::from_args(&args(&["--bogus"])).unwrap_err(),
            ConfigError::UnknownOption("--bogus".to_string())
        );
        assert_eq!(
            RuntimeConfig::from_args(&args(&["--device"])).unwrap_err(),
            ConfigError::MissingValue("--device".to_string())
        );
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--sampling-ms", "0"])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--threshold-mc", "warm"])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_args(&args(&["--mode", "turbo"])),
            Err(ConfigError::Mode(_))
        ));
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["--help", "--bogus"])).unwrap();
        assert!(cfg.show_help);
    }
}
