//! Client-side self-throttling per backend endpoint
//!
//! Counters are bucketed by `(endpoint, minute)`. A call is refused when its
//! minute bucket is full or when it comes sooner than the endpoint's minimum
//! gap. Refusals also count against the bucket; once a bucket is more than
//! half full, the endpoint is pushed into a cooldown.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockpulse_core::{Clock, LimitPolicy};

const MINUTE_MS: i64 = 60_000;

/// Backend operations with their own limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Submit,
    Status,
    Result,
    Module,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Submit => "submit",
            Endpoint::Status => "status",
            Endpoint::Result => "result",
            Endpoint::Module => "module",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one endpoint's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStatus {
    pub requests_this_minute: u32,
    /// Milliseconds since the epoch; may lie in the future during a cooldown
    pub last_request_at: Option<i64>,
}

#[derive(Default)]
struct LimiterState {
    buckets: HashMap<(Endpoint, i64), u32>,
    last_request: HashMap<Endpoint, i64>,
}

impl LimiterState {
    fn prune(&mut self, current_minute: i64) {
        self.buckets.retain(|(_, minute), _| *minute >= current_minute);
    }
}

pub struct RequestLimiter {
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl RequestLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Returns true when the call must not go out now. A false answer admits
    /// the call and records it.
    pub fn should_throttle(&self, endpoint: Endpoint, policy: &LimitPolicy) -> bool {
        let now = self.clock.now_millis();
        let minute = now.div_euclid(MINUTE_MS);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let count = state.buckets.get(&(endpoint, minute)).copied().unwrap_or(0);
        if count >= policy.max_per_minute {
            tracing::debug!("{} throttled: {} calls this minute", endpoint, count);
            return true;
        }

        let min_interval = policy.min_interval_ms as i64;
        if let Some(&last) = state.last_request.get(&endpoint) {
            if now - last < min_interval {
                let count = count.saturating_add(1);
                state.prune(minute);
                state.buckets.insert((endpoint, minute), count);
                if u64::from(count) * 2 > u64::from(policy.max_per_minute) {
                    let resume_at = now + policy.cooldown_ms as i64 - min_interval;
                    if resume_at > last {
                        tracing::warn!(
                            "{} calls too frequent, cooling down for {}ms",
                            endpoint,
                            policy.cooldown_ms
                        );
                        state.last_request.insert(endpoint, resume_at);
                    }
                }
                return true;
            }
        }

        state.prune(minute);
        state.buckets.insert((endpoint, minute), count + 1);
        state.last_request.insert(endpoint, now);
        false
    }

    /// How long to wait before asking again. Zero means a retry may be admitted right away.
    pub fn wait_hint(&self, endpoint: Endpoint, policy: &LimitPolicy) -> Duration {
        let now = self.clock.now_millis();
        let minute = now.div_euclid(MINUTE_MS);
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let count = state.buckets.get(&(endpoint, minute)).copied().unwrap_or(0);
        let until_next_minute = (minute + 1) * MINUTE_MS - now;
        let until_gap = state
            .last_request
            .get(&endpoint)
            .map(|last| last + policy.min_interval_ms as i64 - now)
            .unwrap_or(0);

        let wait = if count >= policy.max_per_minute {
            until_next_minute.max(until_gap)
        } else {
            until_gap
        };
        Duration::from_millis(wait.max(0) as u64)
    }

    pub fn status(&self, endpoint: Endpoint) -> LimiterStatus {
        let minute = self.clock.now_millis().div_euclid(MINUTE_MS);
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        LimiterStatus {
            requests_this_minute: state.buckets.get(&(endpoint, minute)).copied().unwrap_or(0),
            last_request_at: state.last_request.get(&endpoint).copied(),
        }
    }

    /// Forget all counters for `endpoint`
    pub fn reset(&self, endpoint: Endpoint) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.buckets.retain(|(ep, _), _| *ep != endpoint);
        state.last_request.remove(&endpoint);
    }
}
