//! Display-only progress creep while the backend is quiet
//!
//! Purely cosmetic: the smoothed value is never written back into a
//! [`ProgressSnapshot`](stockpulse_core::ProgressSnapshot).

use std::time::Duration;
use tokio::time::Instant;

const STALE_AFTER: Duration = Duration::from_secs(2);
const TICK: Duration = Duration::from_millis(500);
const CAP: f64 = 95.0;

/// Step per tick, smaller as the bar fills
fn band_increment(progress: f64) -> f64 {
    match progress {
        p if p < 20.0 => 2.0,
        p if p < 40.0 => 1.25,
        p if p < 60.0 => 1.0,
        p if p < 80.0 => 0.65,
        _ => 0.35,
    }
}

#[derive(Debug, Clone)]
pub struct ProgressSmoother {
    displayed: f64,
    last_update: Instant,
    last_tick: Instant,
}

impl ProgressSmoother {
    pub fn new(now: Instant) -> Self {
        Self {
            displayed: 0.0,
            last_update: now,
            last_tick: now,
        }
    }

    /// Take an authoritative value from the backend
    pub fn observe(&mut self, progress: f64, now: Instant) {
        self.displayed = self.displayed.max(progress);
        self.last_update = now;
        self.last_tick = now;
    }

    /// Value to display at `now`
    pub fn advance(&mut self, now: Instant) -> f64 {
        let stale_at = self.last_update + STALE_AFTER;
        if now <= stale_at {
            return self.displayed;
        }

        let from = self.last_tick.max(stale_at);
        let ticks = (now.duration_since(from).as_millis() / TICK.as_millis()) as u32;
        for _ in 0..ticks {
            if self.displayed >= CAP {
                break;
            }
            self.displayed = (self.displayed + band_increment(self.displayed)).min(CAP);
        }
        self.last_tick = from + TICK * ticks;
        self.displayed
    }

    pub fn displayed(&self) -> f64 {
        self.displayed
    }
}
