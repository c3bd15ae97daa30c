//! Status polling for a single task
//!
//! `idle -> polling -> {completed, failed, aborted}`. Each tick issues at most
//! one status call; responses that arrive after [`PollingScheduler::stop`] or
//! [`PollingScheduler::restart`] are dropped.

use crate::history::PollingHistory;
use crate::interval::{backoff_interval, next_interval, IntervalInputs};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use stockpulse_client::{ApiError, ResultFetch, TaskApiClient, TaskResult};
use stockpulse_core::{PollingConfig, ProgressSnapshot, TaskStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Polling,
    Completed,
    Failed,
    Aborted,
}

impl SchedulerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SchedulerPhase::Completed | SchedulerPhase::Failed | SchedulerPhase::Aborted
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The backend no longer knows the task
    Expired,
    /// Too many consecutive transient failures
    MaxAttempts(u32),
    /// The backend reported the task as failed
    TaskFailed(String),
    /// A non-retryable client error
    Fatal(ApiError),
}

impl FailureReason {
    pub fn message(&self) -> String {
        match self {
            FailureReason::Expired => "task expired or is no longer known to the server".to_string(),
            FailureReason::MaxAttempts(n) => {
                format!("max attempts exceeded ({} consecutive failures)", n)
            }
            FailureReason::TaskFailed(detail) => format!("analysis failed: {}", detail),
            FailureReason::Fatal(e) => e.user_message(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed {
        snapshot: ProgressSnapshot,
        result: TaskResult,
    },
    Failed {
        reason: FailureReason,
        snapshot: Option<ProgressSnapshot>,
    },
    Aborted,
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Nothing was done: a call was already in flight or polling is over
    Skipped,
    /// Poll again after the given delay
    Continue(Duration),
    Finished(PollOutcome),
}

/// Hooks into the polling loop (default implementations do nothing)
pub trait PollObserver: Send + Sync {
    /// Called after every accepted status response
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}

    /// Called after a retryable failure that did not end polling
    fn on_transient_error(&self, _error: &ApiError, _consecutive_failures: u32) {}
}

pub struct NoopObserver;

impl PollObserver for NoopObserver {}

struct PollState {
    phase: SchedulerPhase,
    generation: u64,
    started: Instant,
    history: PollingHistory,
    interval: Duration,
    failures: u32,
    last_snapshot: Option<ProgressSnapshot>,
    cancel: CancellationToken,
}

impl PollState {
    fn new(config: &PollingConfig) -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            generation: 0,
            started: Instant::now(),
            history: PollingHistory::new(config.history_capacity, config.min_progress_delta),
            interval: config.base_interval(),
            failures: 0,
            last_snapshot: None,
            cancel: CancellationToken::new(),
        }
    }

    fn reset(&mut self, config: &PollingConfig) {
        self.generation += 1;
        self.started = Instant::now();
        self.history.clear();
        self.interval = config.base_interval();
        self.failures = 0;
        self.last_snapshot = None;
        self.cancel = CancellationToken::new();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.phase == SchedulerPhase::Polling && self.generation == generation
    }
}

/// Clears the in-flight flag when a poll ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PollingScheduler {
    client: TaskApiClient,
    task_id: String,
    config: PollingConfig,
    use_cache: bool,
    observer: Arc<dyn PollObserver>,
    state: Mutex<PollState>,
    in_flight: AtomicBool,
}

impl PollingScheduler {
    pub fn new(client: TaskApiClient, task_id: impl Into<String>, config: PollingConfig) -> Self {
        let state = PollState::new(&config);
        Self {
            client,
            task_id: task_id.into(),
            config,
            use_cache: true,
            observer: Arc::new(NoopObserver),
            state: Mutex::new(state),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PollObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Whether the final result may come from the local cache
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.state().phase
    }

    pub fn current_interval(&self) -> Duration {
        self.state().interval
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state().failures
    }

    pub fn history_len(&self) -> usize {
        self.state().history.len()
    }

    pub fn last_snapshot(&self) -> Option<ProgressSnapshot> {
        self.state().last_snapshot.clone()
    }

    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Leave `idle` for `polling`. Returns the token that ends this run.
    fn begin(&self) -> Option<CancellationToken> {
        let mut st = self.state();
        match st.phase {
            SchedulerPhase::Idle => {
                st.reset(&self.config);
                st.phase = SchedulerPhase::Polling;
                Some(st.cancel.clone())
            }
            SchedulerPhase::Polling => Some(st.cancel.clone()),
            _ => None,
        }
    }

    /// Cancel the pending timer and move to `aborted`
    pub fn stop(&self) {
        let mut st = self.state();
        if !st.phase.is_terminal() {
            st.phase = SchedulerPhase::Aborted;
            tracing::debug!("polling for {} stopped", self.task_id);
        }
        st.generation += 1;
        st.cancel.cancel();
    }

    /// Reset attempts, history and the elapsed-time origin and re-enter `polling`.
    /// A running loop drops its pending timer and polls again right away.
    pub fn restart(&self) {
        let mut st = self.state();
        st.cancel.cancel();
        st.reset(&self.config);
        st.phase = SchedulerPhase::Polling;
        tracing::debug!("polling for {} restarted", self.task_id);
    }

    /// Poll until the task reaches a terminal state or polling is stopped.
    /// A [`restart`](Self::restart) during the run resets state and keeps the loop going.
    pub async fn run(&self) -> PollOutcome {
        let mut token = match self.begin() {
            Some(token) => token,
            None => return PollOutcome::Aborted,
        };

        if !pause(&token, self.config.initial_delay()).await {
            match self.live_token() {
                Some(fresh) => token = fresh,
                None => return PollOutcome::Aborted,
            }
        }

        loop {
            let delay = match self.poll_once().await {
                PollStep::Finished(outcome) => return outcome,
                PollStep::Continue(delay) => delay,
                PollStep::Skipped => {
                    if self.phase() != SchedulerPhase::Polling {
                        return PollOutcome::Aborted;
                    }
                    self.current_interval()
                }
            };
            if token.is_cancelled() || !pause(&token, delay).await {
                match self.live_token() {
                    Some(fresh) => token = fresh,
                    None => return PollOutcome::Aborted,
                }
            }
        }
    }

    /// Token of the current run, or `None` once polling has ended
    fn live_token(&self) -> Option<CancellationToken> {
        let st = self.state();
        if st.phase != SchedulerPhase::Polling {
            return None;
        }
        tracing::debug!("polling for {} resumed after restart", self.task_id);
        Some(st.cancel.clone())
    }

    /// One tick: a status call and, on completion, the result fetch
    pub async fn poll_once(&self) -> PollStep {
        let generation = {
            let st = self.state();
            if st.phase != SchedulerPhase::Polling {
                return PollStep::Skipped;
            }
            st.generation
        };

        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("status call for {} still in flight, skipping tick", self.task_id);
            return PollStep::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        match self.client.get_status(&self.task_id).await {
            Ok(snapshot) => self.on_snapshot(generation, snapshot).await,
            Err(e) => self.on_error(generation, e),
        }
    }

    async fn on_snapshot(&self, generation: u64, snapshot: ProgressSnapshot) -> PollStep {
        let snapshot = {
            let mut st = self.state();
            if !st.is_current(generation) {
                tracing::debug!("discarding late status for {}", self.task_id);
                return PollStep::Skipped;
            }
            st.failures = 0;

            let mut snapshot = snapshot.normalized();
            if snapshot.status == TaskStatus::Running {
                if let Some(prev) = &st.last_snapshot {
                    snapshot.progress = snapshot.progress.max(prev.progress);
                }
            }

            let (now, used) = (Instant::now(), st.interval);
            st.history.record(now, snapshot.progress, used);
            st.last_snapshot = Some(snapshot.clone());
            snapshot
        };
        self.observer.on_progress(&snapshot);

        match snapshot.status {
            TaskStatus::Completed => self.fetch_result(generation, snapshot).await,
            TaskStatus::Failed => {
                let detail = [snapshot.error.as_deref(), Some(snapshot.message.as_str())]
                    .into_iter()
                    .flatten()
                    .find(|s| !s.is_empty())
                    .unwrap_or("unknown error")
                    .to_string();
                self.finish_failed(generation, FailureReason::TaskFailed(detail), Some(snapshot))
            }
            TaskStatus::Pending | TaskStatus::Running => {
                let mut st = self.state();
                if !st.is_current(generation) {
                    return PollStep::Skipped;
                }
                let now = Instant::now();
                let inputs = IntervalInputs {
                    elapsed: now.duration_since(st.started),
                    progress: snapshot.progress,
                    rate_per_ms: st.history.average_rate(self.config.rate_window),
                    since_last_change: st.history.since_last_change(now),
                };
                st.interval = next_interval(&self.config, &inputs);
                tracing::debug!(
                    "{} at {:.0}% ({}), next poll in {:?}",
                    self.task_id,
                    snapshot.progress,
                    snapshot.status,
                    st.interval
                );
                PollStep::Continue(st.interval)
            }
        }
    }

    async fn fetch_result(&self, generation: u64, snapshot: ProgressSnapshot) -> PollStep {
        match self.client.get_result(&self.task_id, self.use_cache).await {
            Ok(ResultFetch::Ready(result)) => {
                let mut st = self.state();
                if !st.is_current(generation) {
                    return PollStep::Skipped;
                }
                st.phase = SchedulerPhase::Completed;
                tracing::info!(
                    "task {} completed{}",
                    self.task_id,
                    if result.from_cache { " (cached result)" } else { "" }
                );
                PollStep::Finished(PollOutcome::Completed { snapshot, result })
            }
            Ok(ResultFetch::Processing) => {
                let st = self.state();
                if !st.is_current(generation) {
                    return PollStep::Skipped;
                }
                tracing::debug!("result for {} still being assembled", self.task_id);
                PollStep::Continue(st.interval)
            }
            Err(e) => self.on_error(generation, e),
        }
    }

    fn on_error(&self, generation: u64, error: ApiError) -> PollStep {
        if error.is_not_found() {
            let snapshot = self.last_snapshot();
            return self.finish_failed(generation, FailureReason::Expired, snapshot);
        }
        if !error.is_retryable() {
            let snapshot = self.last_snapshot();
            return self.finish_failed(generation, FailureReason::Fatal(error), snapshot);
        }

        let (failures, next) = {
            let mut st = self.state();
            if !st.is_current(generation) {
                return PollStep::Skipped;
            }
            st.failures += 1;
            if st.failures <= self.config.max_attempts {
                st.interval = backoff_interval(&self.config, st.interval);
            }
            (st.failures, st.interval)
        };

        if failures > self.config.max_attempts {
            let snapshot = self.last_snapshot();
            return self.finish_failed(generation, FailureReason::MaxAttempts(failures), snapshot);
        }

        tracing::warn!(
            "polling {} failed ({} in a row): {}; retrying in {:?}",
            self.task_id,
            failures,
            error,
            next
        );
        self.observer.on_transient_error(&error, failures);
        PollStep::Continue(next)
    }

    fn finish_failed(
        &self,
        generation: u64,
        reason: FailureReason,
        snapshot: Option<ProgressSnapshot>,
    ) -> PollStep {
        let mut st = self.state();
        if !st.is_current(generation) {
            return PollStep::Skipped;
        }
        st.phase = SchedulerPhase::Failed;
        tracing::warn!("task {} failed: {}", self.task_id, reason);
        PollStep::Finished(PollOutcome::Failed { reason, snapshot })
    }
}

async fn pause(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
