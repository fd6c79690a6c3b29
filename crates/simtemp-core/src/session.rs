use crate::reader::{ReaderConfig, SampleReader, SessionReport, StopSignal};
use crate::sink::DeliverySink;
use crate::source::SampleSource;
use std::io;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::info;

pub const READER_THREAD_NAME: &str = "simtemp-reader";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("reader thread panicked")]
    WorkerPanicked,
}

/// A reader running on its own worker thread.
///
/// The caller keeps this handle to stop and join the worker; events arrive
/// through the sink handed to [`ReaderSession::spawn`].
pub struct ReaderSession {
    stop: StopSignal,
    handle: JoinHandle<SessionReport>,
}

impl ReaderSession {
    pub fn spawn<S, K>(source: S, sink: K, config: ReaderConfig) -> Result<Self, SessionError>
    where
        S: SampleSource + 'static,
        K: DeliverySink + 'static,
    {
        let stop = StopSignal::new();
        let worker_stop = stop.clone();
        info!(
            source = %source.describe(),
            poll_ms = config.poll_interval.as_millis() as u64,
            termination = ?config.termination,
            "Starting reader session"
        );

        let handle = thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || SampleReader::new(source, sink, config).run(&worker_stop))?;

        Ok(Self { stop, handle })
    }

    /// Clone of the stop flag, for signal handlers and timers.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<SessionReport, SessionError> {
        self.handle.join().map_err(|_| SessionError::WorkerPanicked)
    }
}
