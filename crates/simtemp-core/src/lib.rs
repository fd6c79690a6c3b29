pub mod history;
pub mod reader;
pub mod record;
mod record_proptest;
pub mod session;
pub mod sink;
pub mod source;
#[cfg(feature = "simulation")]
pub mod source_sim;
pub mod timebase;

pub use history::{HistorySummary, SampleHistory, DEFAULT_HISTORY_CAPACITY};
pub use reader::{
    ReaderConfig, ReaderState, ReaderStats, SampleReader, SessionOutcome, SessionReport,
    StopSignal, Termination,
};
pub use record::{decode, encode, FrameError, Sample, FLAG_ALERT, FLAG_NEW_SAMPLE, RECORD_SIZE};
pub use session::{ReaderSession, SessionError};
pub use sink::{ChannelSink, DeliverySink, DiagnosticKind, EventReceiver, ReaderEvent};
pub use source::{ReadOutcome, SampleSource, SourceError};
#[cfg(feature = "simulation")]
pub use source_sim::{ParseModeError, SimConfig, SimMode, SyntheticSource};
pub use timebase::TimeBase;
