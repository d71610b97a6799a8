use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::models::BatchSummary;

pub const DEFAULT_HISTORY_CAPACITY: usize = 16;

/// Most recent batch summaries, kept for the lifetime of the process.
///
/// Oldest runs are dropped once `capacity` is reached.
pub struct RunHistory {
    capacity: usize,
    runs: Mutex<VecDeque<BatchSummary>>,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            runs: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, summary: BatchSummary) {
        let mut runs = self.runs.lock();
        while runs.len() >= self.capacity {
            runs.pop_front();
        }
        runs.push_back(summary);
    }

    pub fn latest(&self) -> Option<BatchSummary> {
        self.runs.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
