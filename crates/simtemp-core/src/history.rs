use crate::record::Sample;
use std::collections::VecDeque;

/// Entries kept by a display-style consumer unless told otherwise.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Bounded ring of recent samples for GUI-style consumers.
///
/// The reader never owns one; a consumer fills it from delivered events.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    entries: VecDeque<Sample>,
    capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySummary {
    pub count: usize,
    pub min_mc: i32,
    pub max_mc: i32,
    pub mean_mc: f64,
    pub alerts: usize,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.entries.back()
    }

    /// Newest first, the order a scrolling list shows them.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Sample> {
        self.entries.iter().rev()
    }

    pub fn summary(&self) -> Option<HistorySummary> {
        let first = self.entries.front()?;
        let mut min_mc = first.temperature_mc();
        let mut max_mc = first.temperature_mc();
        let mut total: i64 = 0;
        let mut alerts = 0;
        for sample in &self.entries {
            min_mc = min_mc.min(sample.temperature_mc());
            max_mc = max_mc.max(sample.temperature_mc());
            total += i64::from(sample.temperature_mc());
            if sample.is_alert() {
                alerts += 1;
            }
        }
        Some(HistorySummary {
            count: self.entries.len(),
            min_mc,
            max_mc,
            mean_mc: total as f64 / self.entries.len() as f64,
            alerts,
        })
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
