use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic origin for a reader process, plus wall-clock helpers.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    origin: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn elapsed_ns(&self) -> u64 {
        saturating_ns(self.origin.elapsed())
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_ns() / 1_000
    }

    /// Nanoseconds since the Unix epoch. Synthetic samples are stamped with this clock.
    pub fn unix_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(saturating_ns)
            .unwrap_or_default()
    }

    pub fn unix_us(&self) -> u64 {
        self.unix_ns() / 1_000
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
