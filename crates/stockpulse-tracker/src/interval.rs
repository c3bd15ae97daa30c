//! Adaptive polling interval
//!
//! The next delay is `I0 + f * (Imax - I0)` where `f` is the largest of three
//! factors in `[0, 1]`: elapsed time over the horizon, reported progress, and
//! stagnation (slow recent progress pushes toward 1). A task that has shown no
//! change for a while gets a shorter delay so completion is noticed sooner.

use std::time::Duration;
use stockpulse_core::PollingConfig;

/// Scale at which progress velocity (points per ms) saturates the stagnation factor
const RATE_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntervalInputs {
    /// Time since polling started
    pub elapsed: Duration,
    /// Reported percentage
    pub progress: f64,
    /// Mean progress per millisecond over recent polls, when known
    pub rate_per_ms: Option<f64>,
    /// Time since progress last moved
    pub since_last_change: Option<Duration>,
}

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn time_factor(config: &PollingConfig, elapsed: Duration) -> f64 {
    let horizon = config.time_horizon().as_secs_f64();
    if horizon <= 0.0 {
        return 1.0;
    }
    unit(elapsed.as_secs_f64() / horizon)
}

pub fn progress_factor(progress: f64) -> f64 {
    unit(progress / 100.0)
}

pub fn stagnation_factor(rate_per_ms: Option<f64>) -> f64 {
    match rate_per_ms {
        Some(rate) => unit(1.0 - rate * RATE_SCALE),
        None => 0.0,
    }
}

/// Delay before the next poll, always within `[I0, Imax]`
pub fn next_interval(config: &PollingConfig, inputs: &IntervalInputs) -> Duration {
    let base = config.base_interval().as_secs_f64() * 1000.0;
    let max = config.max_interval().as_secs_f64() * 1000.0;

    let factor = time_factor(config, inputs.elapsed)
        .max(progress_factor(inputs.progress))
        .max(stagnation_factor(inputs.rate_per_ms));
    let mut interval = base + factor * (max - base);

    let stalled = inputs
        .since_last_change
        .is_some_and(|quiet| quiet > config.stall_after());
    if stalled && inputs.progress > 0.0 {
        interval = (interval * config.stall_shrink).max(base);
    }

    Duration::from_millis(interval.round().clamp(base, max) as u64)
}

/// Delay after a transient failure: back off geometrically, or return to `I0`
pub fn backoff_interval(config: &PollingConfig, current: Duration) -> Duration {
    if config.reset_on_error {
        return config.base_interval();
    }
    current
        .mul_f64(config.backoff_multiplier.max(1.0))
        .clamp(config.base_interval(), config.max_interval())
}
