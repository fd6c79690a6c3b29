use crate::record::{FrameError, Sample};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures. Always fatal to the reader session.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceError {
    #[error("device {} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied opening {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("device {} went away: {detail}", path.display())]
    Disconnected { path: PathBuf, detail: String },

    #[error("I/O error on {}: {detail}", path.display())]
    Io { path: PathBuf, detail: String },

    #[error("source is not open")]
    NotOpen,
}

/// Result of a single `read_one` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Decoded(Sample),
    /// Zero bytes: the producer is idle. Never end-of-stream.
    Empty,
    /// A short read of the given length; the bytes are discarded.
    Partial(usize),
    TimedOut,
    SourceUnavailable(SourceError),
}

impl ReadOutcome {
    /// Classifies the bytes returned by one read call.
    pub fn from_read(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return ReadOutcome::Empty;
        }
        match Sample::try_from(bytes) {
            Ok(sample) => ReadOutcome::Decoded(sample),
            Err(FrameError::Length { actual, .. }) => ReadOutcome::Partial(actual),
        }
    }
}

/// Capability shared by the device handle and the synthetic generator.
///
/// Implementations are confined to the reader's worker thread; `read_one`
/// must return within `wait` plus the cost of one read.
pub trait SampleSource: Send {
    fn open(&mut self) -> Result<(), SourceError>;
    fn read_one(&mut self, wait: Duration) -> ReadOutcome;
    fn close(&mut self);
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{encode, RECORD_SIZE};

    #[test]
    fn zero_bytes_is_idle() {
        assert_eq!(ReadOutcome::from_read(&[]), ReadOutcome::Empty);
    }

    #[test]
    fn short_reads_are_partial() {
        let buf = [0xFFu8; RECORD_SIZE];
        for len in 1..RECORD_SIZE {
            assert_eq!(ReadOutcome::from_read(&buf[..len]), ReadOutcome::Partial(len));
        }
    }

    #[test]
    fn full_record_decodes() {
        let sample = Sample::new(1_000, 21_500, 1);
        assert_eq!(
            ReadOutcome::from_read(&encode(&sample)),
            ReadOutcome::Decoded(sample)
        );
    }

    #[test]
    fn source_error_messages_name_the_path() {
        let err = SourceError::NotFound {
            path: PathBuf::from("/dev/simtemp"),
        };
        assert_eq!(err.to_string(), "device /dev/simtemp not found");
    }
}
