//! JSONL record of everything the reader delivered.
//!
//! One line per event, appended, so several runs can share a file.

use serde::{Deserialize, Serialize};
use simtemp_core::sink::ReaderEvent;
use simtemp_core::timebase::TimeBase;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    Sample,
    Diagnostic,
    Fatal,
    SessionEnd,
}

impl From<&ReaderEvent> for EventKind {
    fn from(event: &ReaderEvent) -> Self {
        match event {
            ReaderEvent::Sample(_) => EventKind::Sample,
            ReaderEvent::Diagnostic { .. } => EventKind::Diagnostic,
            ReaderEvent::Fatal { .. } => EventKind::Fatal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    /// Microseconds since the process time base
    pub elapsed_us: u64,
    pub unix_us: u64,
    pub kind: EventKind,
    pub details: serde_json::Value,
}

/// Thread-safe appender for [`EventEntry`] lines.
pub struct EventLog {
    writer: Mutex<BufWriter<File>>,
}

impl EventLog {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: &EventEntry) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        timebase: &TimeBase,
        kind: EventKind,
        details: serde_json::Value,
    ) -> io::Result<()> {
        self.log(&EventEntry {
            elapsed_us: timebase.elapsed_us(),
            unix_us: timebase.unix_us(),
            kind,
            details,
        })
    }

    pub fn record(&self, timebase: &TimeBase, event: &ReaderEvent) -> io::Result<()> {
        let details = serde_json::to_value(event)?;
        self.log_event(timebase, EventKind::from(event), details)
    }
}
