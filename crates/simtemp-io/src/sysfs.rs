//! Host side of the driver's sysfs attributes.
//!
//! The reader never touches these; they only shape what the device produces.

use serde::Serialize;
use simtemp_core::source_sim::{SimConfig, SimMode};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

pub const SYSFS_CLASS_PATH: &str = "/sys/class/simtemp/simtemp";
pub const SYSFS_PLATFORM_PATH: &str = "/sys/devices/platform/nxp_simtemp";

pub const ATTR_SAMPLING_MS: &str = "sampling_ms";
pub const ATTR_THRESHOLD_MC: &str = "threshold_mC";
pub const ATTR_MODE: &str = "mode";
pub const ATTR_STATS: &str = "stats";

#[derive(Debug, Error)]
pub enum AttributeError {
    #[error("no simtemp attribute directory found (tried {tried})")]
    NotFound { tried: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {value:?} to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        value: String,
        #[source]
        source: io::Error,
    },

    #[error("unexpected contents {value:?} in {}", path.display())]
    Invalid { path: PathBuf, value: String },

    #[error("sampling_ms must be positive")]
    ZeroSampling,
}

/// Driver counters from the read-only `stats` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub updates: u64,
    pub alerts: u64,
    pub drops: u64,
}

impl FromStr for DeviceStats {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mut updates, mut alerts, mut drops) = (None, None, None);
        for token in s.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| format!("malformed token {token:?}"))?;
            let value: u64 = value
                .parse()
                .map_err(|_| format!("non-numeric value in {token:?}"))?;
            match key {
                "updates" => updates = Some(value),
                "alerts" => alerts = Some(value),
                "drops" => drops = Some(value),
                _ => {}
            }
        }
        match (updates, alerts, drops) {
            (Some(updates), Some(alerts), Some(drops)) => Ok(Self {
                updates,
                alerts,
                drops,
            }),
            _ => Err("missing one of updates, alerts, drops".to_string()),
        }
    }
}

impl fmt::Display for DeviceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updates={} alerts={} drops={}",
            self.updates, self.alerts, self.drops
        )
    }
}

#[derive(Debug, Clone)]
pub struct SysfsAttributes {
    base: PathBuf,
}

impl SysfsAttributes {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Class directory first, then the platform device directory.
    pub fn discover() -> Result<Self, AttributeError> {
        Self::discover_from(&[SYSFS_CLASS_PATH, SYSFS_PLATFORM_PATH])
    }

    pub fn discover_from<P: AsRef<Path>>(candidates: &[P]) -> Result<Self, AttributeError> {
        for candidate in candidates {
            let candidate = candidate.as_ref();
            if candidate.join(ATTR_SAMPLING_MS).exists() {
                debug!(path = %candidate.display(), "Found sysfs attributes");
                return Ok(Self::new(candidate));
            }
        }
        let tried = candidates
            .iter()
            .map(|c| c.as_ref().display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(AttributeError::NotFound { tried })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn sampling_ms(&self) -> Result<u32, AttributeError> {
        self.read_parsed(ATTR_SAMPLING_MS)
    }

    pub fn set_sampling_ms(&self, sampling_ms: u32) -> Result<(), AttributeError> {
        if sampling_ms == 0 {
            return Err(AttributeError::ZeroSampling);
        }
        self.write_attr(ATTR_SAMPLING_MS, sampling_ms)
    }

    pub fn threshold_mc(&self) -> Result<i32, AttributeError> {
        self.read_parsed(ATTR_THRESHOLD_MC)
    }

    pub fn set_threshold_mc(&self, threshold_mc: i32) -> Result<(), AttributeError> {
        self.write_attr(ATTR_THRESHOLD_MC, threshold_mc)
    }

    pub fn mode(&self) -> Result<SimMode, AttributeError> {
        self.read_parsed(ATTR_MODE)
    }

    pub fn set_mode(&self, mode: SimMode) -> Result<(), AttributeError> {
        self.write_attr(ATTR_MODE, mode)
    }

    pub fn stats(&self) -> Result<DeviceStats, AttributeError> {
        self.read_parsed(ATTR_STATS)
    }

    pub fn load(&self) -> Result<SimConfig, AttributeError> {
        Ok(SimConfig {
            sampling_ms: self.sampling_ms()?,
            threshold_mc: self.threshold_mc()?,
            mode: self.mode()?,
        })
    }

    /// Writes sampling, mode, then threshold. Stops at the first failure.
    pub fn apply(&self, config: &SimConfig) -> Result<(), AttributeError> {
        self.set_sampling_ms(config.sampling_ms)?;
        self.set_mode(config.mode)?;
        self.set_threshold_mc(config.threshold_mc)?;
        info!(
            base = %self.base.display(),
            sampling_ms = config.sampling_ms,
            threshold_mc = config.threshold_mc,
            mode = %config.mode,
            "Applied device configuration"
        );
        Ok(())
    }

    fn read_attr(&self, name: &str) -> Result<String, AttributeError> {
        let path = self.base.join(name);
        fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|source| AttributeError::Read { path, source })
    }

    fn read_parsed<T: FromStr>(&self, name: &str) -> Result<T, AttributeError> {
        let value = self.read_attr(name)?;
        value.parse().map_err(|_| AttributeError::Invalid {
            path: self.base.join(name),
            value,
        })
    }

    fn write_attr(&self, name: &str, value: impl fmt::Display) -> Result<(), AttributeError> {
        let path = self.base.join(name);
        let value = format!("{value}\n");
        fs::write(&path, &value).map_err(|source| AttributeError::Write {
            path,
            value: value.trim_end().to_string(),
            source,
        })
    }
}
