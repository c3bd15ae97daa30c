//! Recent poll observations used to estimate progress velocity

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub at: Instant,
    pub progress: f64,
    /// Interval that preceded this poll
    pub interval: Duration,
}

/// Bounded log of successful polls. Never persisted.
#[derive(Debug, Clone)]
pub struct PollingHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    min_progress_delta: f64,
    last_change: Option<Instant>,
}

impl PollingHistory {
    pub fn new(capacity: usize, min_progress_delta: f64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            min_progress_delta,
            last_change: None,
        }
    }

    pub fn record(&mut self, at: Instant, progress: f64, interval: Duration) {
        let changed = match self.entries.back() {
            None => true,
            Some(prev) => (progress - prev.progress).abs() >= self.min_progress_delta,
        };
        if changed {
            self.last_change = Some(at);
        }

        self.entries.push_back(HistoryEntry {
            at,
            progress,
            interval,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Mean forward progress per millisecond over the last `window` entries.
    /// `None` until two entries exist.
    pub fn average_rate(&self, window: usize) -> Option<f64> {
        if self.entries.len() < 2 {
            return None;
        }

        let skip = self.entries.len().saturating_sub(window.max(2));
        let recent: Vec<&HistoryEntry> = self.entries.iter().skip(skip).collect();

        let (mut gained, mut elapsed_ms) = (0.0, 0.0);
        for pair in recent.windows(2) {
            gained += (pair[1].progress - pair[0].progress).max(0.0);
            elapsed_ms += pair[1].at.duration_since(pair[0].at).as_secs_f64() * 1000.0;
        }

        Some(if elapsed_ms > 0.0 { gained / elapsed_ms } else { 0.0 })
    }

    /// Time since the last change of at least `min_progress_delta`
    pub fn since_last_change(&self, now: Instant) -> Option<Duration> {
        self.last_change.map(|at| now.saturating_duration_since(at))
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_change = None;
    }
}
