//! Consumer-facing notification boundary.
//!
//! The reader calls [`DeliverySink::deliver`] on its own worker thread. A sink
//! whose consumer lives elsewhere (UI loop, CLI printer, test harness) hands
//! the event off through its own buffering; `deliver` must not block the
//! reader for longer than one poll interval.

use crate::record::Sample;
use crate::source::SourceError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{
    self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A read returned fewer bytes than one record; the bytes were discarded.
    PartialRecord,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::PartialRecord => "partial_record",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReaderEvent {
    Sample(Sample),
    Diagnostic {
        kind: DiagnosticKind,
        detail: String,
    },
    Fatal {
        reason: SourceError,
    },
}

impl ReaderEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ReaderEvent::Sample(_) => "sample",
            ReaderEvent::Diagnostic { .. } => "diagnostic",
            ReaderEvent::Fatal { .. } => "fatal",
        }
    }
}

pub trait DeliverySink: Send {
    fn deliver(&mut self, event: ReaderEvent);
}

impl<F> DeliverySink for F
where
    F: FnMut(ReaderEvent) + Send,
{
    fn deliver(&mut self, event: ReaderEvent) {
        self(event)
    }
}

/// Bounded queue handoff. A full queue drops the event instead of blocking.
///
/// One slot beyond `capacity` is held back for the terminal `Fatal`, so a
/// consumer that fell behind still learns why the session ended.
#[derive(Debug)]
pub struct ChannelSink {
    tx: SyncSender<ReaderEvent>,
    capacity: usize,
    queued: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, EventReceiver) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::sync_channel(capacity + 1);
        let queued = Arc::new(AtomicUsize::new(0));
        let sink = Self {
            tx,
            capacity,
            queued: Arc::clone(&queued),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, EventReceiver { rx, queued })
    }

    /// Shared count of events dropped on a full queue; stays readable after
    /// the sink has moved to the reader thread.
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    fn drop_event(&self, event: &ReaderEvent) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(kind = event.kind(), dropped, "Delivery queue full, dropping event");
    }
}

impl DeliverySink for ChannelSink {
    fn deliver(&mut self, event: ReaderEvent) {
        // `queued` only overestimates: the consumer decrements after it receives.
        let terminal = matches!(event, ReaderEvent::Fatal { .. });
        if !terminal && self.queued.load(Ordering::Acquire) >= self.capacity {
            self.drop_event(&event);
            return;
        }

        self.queued.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                self.drop_event(&event);
            }
            Err(TrySendError::Disconnected(event)) => {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                debug!(kind = event.kind(), "Delivery queue closed by consumer");
            }
        }
    }
}

/// Consumer end of a [`ChannelSink`].
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<ReaderEvent>,
    queued: Arc<AtomicUsize>,
}

impl EventReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        let event = self.rx.recv_timeout(timeout)?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Ok(event)
    }

    pub fn try_recv(&self) -> Result<ReaderEvent, TryRecvError> {
        let event = self.rx.try_recv()?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Ok(event)
    }

    /// Everything queued right now, without waiting.
    pub fn try_iter(&self) -> impl Iterator<Item = ReaderEvent> + '_ {
        std::iter::from_fn(|| self.try_recv().ok())
    }
}
