//! Fixed-layout binary sample record.
//!
//! | Offset | Size | Field            | Type |
//! |--------|------|------------------|------|
//! | 0      | 8    | `timestamp_ns`   | u64  |
//! | 8      | 4    | `temperature_mc` | i32  |
//! | 12     | 4    | `flags`          | u32  |
//!
//! All fields are little-endian with no padding. The codec is a pure byte
//! layout transform: it never validates temperature ranges or flag meaning.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size in bytes of one encoded record.
pub const RECORD_SIZE: usize = 16;

/// Set on every record produced since the last read.
pub const FLAG_NEW_SAMPLE: u32 = 0x1;
/// Set when the temperature is at or above the configured threshold.
pub const FLAG_ALERT: u32 = 0x2;

/// One decoded temperature measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    timestamp_ns: u64,
    temperature_mc: i32,
    flags: u32,
}

impl Sample {
    pub const fn new(timestamp_ns: u64, temperature_mc: i32, flags: u32) -> Self {
        Self {
            timestamp_ns,
            temperature_mc,
            flags,
        }
    }

    pub const fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Temperature in milli-degrees Celsius.
    pub const fn temperature_mc(&self) -> i32 {
        self.temperature_mc
    }

    /// Raw flag word, reserved bits included.
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    pub const fn is_new(&self) -> bool {
        self.flags & FLAG_NEW_SAMPLE != 0
    }

    pub const fn is_alert(&self) -> bool {
        self.flags & FLAG_ALERT != 0
    }

    pub fn temperature_c(&self) -> f64 {
        f64::from(self.temperature_mc) / 1000.0
    }
}

/// Raised by the caller-side length filter in front of [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("record must be exactly {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Decodes one record. The array type makes the exact length a caller obligation.
pub fn decode(buf: &[u8; RECORD_SIZE]) -> Sample {
    let timestamp_ns = u64::from_le_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ]);
    let temperature_mc = i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let flags = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
    Sample::new(timestamp_ns, temperature_mc, flags)
}

/// Encodes one record; exact inverse of [`decode`].
pub fn encode(sample: &Sample) -> [u8; RECORD_SIZE] {
    let mut out = [0u8; RECORD_SIZE];
    out[0..8].copy_from_slice(&sample.timestamp_ns.to_le_bytes());
    out[8..12].copy_from_slice(&sample.temperature_mc.to_le_bytes());
    out[12..16].copy_from_slice(&sample.flags.to_le_bytes());
    out
}

impl TryFrom<&[u8]> for Sample {
    type Error = FrameError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let record = <&[u8; RECORD_SIZE]>::try_from(bytes).map_err(|_| FrameError::Length {
            expected: RECORD_SIZE,
            actual: bytes.len(),
        })?;
        Ok(decode(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_record() {
        let raw: [u8; RECORD_SIZE] = [
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // timestamp_ns
            0xA0, 0x8C, 0x00, 0x00, // 36000 mC
            0x03, 0x00, 0x00, 0x00, // new | alert
        ];
        let sample = decode(&raw);
        assert_eq!(sample, Sample::new(0, 36_000, 3));
        assert!(sample.is_new());
        assert!(sample.is_alert());
        assert_eq!(encode(&sample), raw);
    }

    #[test]
    fn keeps_reserved_flag_bits() {
        let sample = Sample::new(42, 25_000, 0xDEAD_0001);
        let decoded = decode(&encode(&sample));
        assert_eq!(decoded.flags(), 0xDEAD_0001);
        assert!(decoded.is_new());
        assert!(!decoded.is_alert());
    }

    #[test]
    fn negative_temperature_survives() {
        let sample = Sample::new(u64::MAX, -40_500, FLAG_NEW_SAMPLE);
        let decoded = decode(&encode(&sample));
        assert_eq!(decoded.temperature_mc(), -40_500);
        assert_eq!(decoded.temperature_c(), -40.5);
        assert_eq!(decoded.timestamp_ns(), u64::MAX);
    }

    #[test]
    fn rejects_wrong_lengths() {
        let bytes = [0u8; RECORD_SIZE + 1];
        assert_eq!(
            Sample::try_from(&bytes[..RECORD_SIZE - 1]),
            Err(FrameError::Length {
                expected: RECORD_SIZE,
                actual: RECORD_SIZE - 1
            })
        );
        assert!(Sample::try_from(&bytes[..]).is_err());
        assert!(Sample::try_from(&bytes[..0]).is_err());
        assert!(Sample::try_from(&bytes[..RECORD_SIZE]).is_ok());
    }
}
