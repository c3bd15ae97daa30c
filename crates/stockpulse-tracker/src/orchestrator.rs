//! Stateful façade over submit, polling, sessions and module loads

use crate::scheduler::{FailureReason, PollObserver, PollOutcome, PollingScheduler};
use crate::smoothing::ProgressSmoother;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use stockpulse_client::{ApiError, TaskApiClient};
use stockpulse_core::{Clock, ModuleDescriptor, PollingConfig, ProgressSnapshot, Task};
use stockpulse_store::SessionStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no completed task to load modules from")]
    NotCompleted,

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl OrchestratorError {
    pub fn user_message(&self) -> String {
        match self {
            OrchestratorError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Status exposed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
    Stopped,
}

impl TaskPhase {
    /// Still waiting on the backend
    pub fn is_active(self) -> bool {
        matches!(self, TaskPhase::Submitting | TaskPhase::Polling)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleState {
    NotLoaded,
    Loading,
    Loaded(Value),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSlot {
    pub module_type: String,
    pub endpoint: String,
    pub state: ModuleState,
}

impl ModuleSlot {
    fn new(descriptor: ModuleDescriptor) -> Self {
        Self {
            module_type: descriptor.module_type,
            endpoint: descriptor.endpoint,
            state: ModuleState::NotLoaded,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskView {
    pub subject: String,
    pub analysis_kind: String,
    pub task: Option<Task>,
    pub phase: TaskPhase,
    /// Authoritative percentage from the last accepted snapshot
    pub progress: f64,
    /// Percentage to draw; equals `progress` unless smoothing is on
    pub display_progress: f64,
    pub snapshot: Option<ProgressSnapshot>,
    pub result: Option<Value>,
    pub from_cache: bool,
    pub modules: Vec<ModuleSlot>,
    /// Terminal error, user-facing
    pub error: Option<String>,
    /// Transient trouble while polling continues
    pub notice: Option<String>,
}

impl TaskView {
    pub fn new(subject: &str, analysis_kind: &str, phase: TaskPhase) -> Self {
        Self {
            subject: subject.to_string(),
            analysis_kind: analysis_kind.to_string(),
            task: None,
            phase,
            progress: 0.0,
            display_progress: 0.0,
            snapshot: None,
            result: None,
            from_cache: false,
            modules: Vec::new(),
            error: None,
            notice: None,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task.as_ref().map(|t| t.id.as_str())
    }

    pub fn module(&self, module_type: &str) -> Option<&ModuleSlot> {
        self.modules.iter().find(|m| m.module_type == module_type)
    }
}

struct ViewState {
    generation: u64,
    view: TaskView,
    use_cache: bool,
    smoother: Option<ProgressSmoother>,
}

struct Inner {
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionStore>,
    state: Mutex<ViewState>,
    phase_tx: watch::Sender<TaskPhase>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, st: &mut ViewState, phase: TaskPhase) {
        st.view.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn finish(&self, generation: u64, outcome: PollOutcome) {
        let mut st = self.state();
        if st.generation != generation {
            tracing::debug!("ignoring outcome of a superseded task");
            return;
        }

        match outcome {
            PollOutcome::Completed { snapshot, result } => {
                st.view.modules = ModuleDescriptor::from_result(&result.data)
                    .into_iter()
                    .map(ModuleSlot::new)
                    .collect();
                st.view.progress = 100.0;
                st.view.snapshot = Some(snapshot);
                st.view.result = Some(result.data);
                st.view.from_cache = result.from_cache;
                st.view.error = None;
                st.view.notice = None;
                if let Some(smoother) = st.smoother.as_mut() {
                    smoother.observe(100.0, Instant::now());
                }
                self.set_phase(&mut st, TaskPhase::Completed);
            }
            PollOutcome::Failed { reason, snapshot } => {
                if let Some(snapshot) = snapshot {
                    st.view.snapshot = Some(snapshot);
                }
                st.view.error = Some(reason.message());
                st.view.notice = None;
                self.set_phase(&mut st, TaskPhase::Failed);
                // still under the lock: the generation check must cover the clear
                self.forget_session(&st.view.subject, &reason);
            }
            PollOutcome::Aborted => {
                if st.view.phase.is_active() {
                    self.set_phase(&mut st, TaskPhase::Stopped);
                }
            }
        }
    }

    fn forget_session(&self, subject: &str, reason: &FailureReason) {
        tracing::info!("clearing session for {}: {}", subject, reason);
        if let Err(e) = self.sessions.clear(subject) {
            tracing::warn!("failed to clear session for {}: {}", subject, e);
        }
    }
}

/// Feeds scheduler events into the view of one task generation
struct ViewObserver {
    inner: Arc<Inner>,
    generation: u64,
}

impl PollObserver for ViewObserver {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let now = self.inner.clock.now();
        let mut st = self.inner.state();
        if st.generation != self.generation {
            return;
        }
        st.view.progress = snapshot.progress;
        st.view.snapshot = Some(snapshot.clone());
        st.view.notice = None;
        if let Some(task) = st.view.task.as_mut() {
            task.touch(now);
        }
        if let Some(smoother) = st.smoother.as_mut() {
            smoother.observe(snapshot.progress, Instant::now());
        }
    }

    fn on_transient_error(&self, error: &ApiError, consecutive_failures: u32) {
        let mut st = self.inner.state();
        if st.generation != self.generation {
            return;
        }
        st.view.notice = Some(format!(
            "{} (retry {})",
            error.user_message(),
            consecutive_failures
        ));
    }
}

struct ActiveRun {
    scheduler: Arc<PollingScheduler>,
    handle: JoinHandle<()>,
}

/// Owns one subject's task at a time: submission, progress, result and modules.
///
/// Must be used inside a tokio runtime; polling runs on a spawned task.
pub struct TaskOrchestrator {
    client: TaskApiClient,
    polling: PollingConfig,
    smooth_progress: bool,
    inner: Arc<Inner>,
    active: Mutex<Option<ActiveRun>>,
}

impl TaskOrchestrator {
    pub fn new(
        client: TaskApiClient,
        sessions: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
        polling: PollingConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(TaskPhase::Idle);
        Self {
            client,
            polling,
            smooth_progress: false,
            inner: Arc::new(Inner {
                clock,
                sessions,
                state: Mutex::new(ViewState {
                    generation: 0,
                    view: TaskView::new("", "", TaskPhase::Idle),
                    use_cache: true,
                    smoother: None,
                }),
                phase_tx,
            }),
            active: Mutex::new(None),
        }
    }

    /// Report a creeping display percentage while the backend is quiet
    pub fn with_smoothing(mut self, enabled: bool) -> Self {
        self.smooth_progress = enabled;
        self
    }

    pub fn client(&self) -> &TaskApiClient {
        &self.client
    }

    /// Begin a fresh state for `subject`, superseding whatever ran before
    fn reset(&self, subject: &str, analysis_kind: &str, phase: TaskPhase, use_cache: bool) -> u64 {
        self.stop_active();
        let mut st = self.inner.state();
        st.generation += 1;
        st.view = TaskView::new(subject, analysis_kind, phase);
        st.use_cache = use_cache;
        st.smoother = self
            .smooth_progress
            .then(|| ProgressSmoother::new(Instant::now()));
        self.inner.set_phase(&mut st, phase);
        st.generation
    }

    /// Submit a new analysis and start tracking it. Returns the task id.
    ///
    /// `force_refresh` drops the subject's session first and bypasses the
    /// local cache for the result.
    pub async fn start(
        &self,
        subject: &str,
        analysis_kind: &str,
        force_refresh: bool,
    ) -> Result<String, OrchestratorError> {
        let generation = self.reset(subject, analysis_kind, TaskPhase::Submitting, !force_refresh);

        if force_refresh {
            if let Err(e) = self.inner.sessions.clear(subject) {
                tracing::warn!("could not clear session for {}: {}", subject, e);
            }
        }

        let task_id = match self.client.submit(subject, analysis_kind, force_refresh).await {
            Ok(id) => id,
            Err(e) => {
                let mut st = self.inner.state();
                if st.generation == generation {
                    st.view.error = Some(e.user_message());
                    self.inner.set_phase(&mut st, TaskPhase::Failed);
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.inner.sessions.record(&task_id, subject, analysis_kind) {
            tracing::warn!("could not persist session for {}: {}", subject, e);
        }

        if self.attach(generation, &task_id) {
            self.spawn_polling(generation, &task_id, !force_refresh);
        }
        Ok(task_id)
    }

    /// Resume tracking the subject's unexpired session, if any, without resubmitting
    pub fn resume(&self, subject: &str) -> Option<String> {
        let record = self.inner.sessions.load(subject)?;
        tracing::info!("resuming task {} for {}", record.task_id, subject);

        let generation = self.reset(subject, &record.analysis_kind, TaskPhase::Polling, true);
        if self.attach(generation, &record.task_id) {
            self.spawn_polling(generation, &record.task_id, true);
        }
        Some(record.task_id)
    }

    /// Start a subject: resume its session unless a refresh is forced, else submit
    pub async fn start_or_resume(
        &self,
        subject: &str,
        analysis_kind: &str,
        force_refresh: bool,
    ) -> Result<String, OrchestratorError> {
        if !force_refresh {
            if let Some(task_id) = self.resume(subject) {
                return Ok(task_id);
            }
        }
        self.start(subject, analysis_kind, force_refresh).await
    }

    fn attach(&self, generation: u64, task_id: &str) -> bool {
        let now = self.inner.clock.now();
        let mut st = self.inner.state();
        if st.generation != generation {
            return false;
        }
        let (subject, kind) = (st.view.subject.clone(), st.view.analysis_kind.clone());
        st.view.task = Some(Task::new(task_id, subject, kind, now));
        self.inner.set_phase(&mut st, TaskPhase::Polling);
        true
    }

    fn spawn_polling(&self, generation: u64, task_id: &str, use_cache: bool) {
        let observer = Arc::new(ViewObserver {
            inner: self.inner.clone(),
            generation,
        });
        let scheduler = Arc::new(
            PollingScheduler::new(self.client.clone(), task_id, self.polling.clone())
                .with_observer(observer)
                .use_cache(use_cache),
        );

        let inner = self.inner.clone();
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move {
            let outcome = runner.run().await;
            inner.finish(generation, outcome);
        });

        let previous = self.lock_active().replace(ActiveRun { scheduler, handle });
        if let Some(previous) = previous {
            previous.scheduler.stop();
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stop_active(&self) {
        if let Some(run) = self.lock_active().take() {
            run.scheduler.stop();
        }
    }

    /// Stop polling; the view keeps what it has
    pub fn stop(&self) {
        self.stop_active();
        let mut st = self.inner.state();
        st.generation += 1;
        if st.view.phase.is_active() {
            self.inner.set_phase(&mut st, TaskPhase::Stopped);
        }
    }

    pub fn current_state(&self) -> TaskView {
        let mut st = self.inner.state();
        let mut view = st.view.clone();
        view.display_progress = match st.smoother.as_mut() {
            Some(smoother) if view.phase == TaskPhase::Polling => {
                smoother.advance(Instant::now()).max(view.progress)
            }
            _ => view.progress,
        };
        view
    }

    /// Wait until the current task leaves the submitting/polling phases
    pub async fn wait(&self) -> TaskView {
        let mut rx = self.inner.phase_tx.subscribe();
        loop {
            if !rx.borrow_and_update().is_active() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.current_state()
    }

    /// Load one module of the completed result; loads of different modules are independent
    pub async fn load_module(&self, module_type: &str) -> Result<Value, OrchestratorError> {
        let (generation, task_id, use_cache) = {
            let mut st = self.inner.state();
            if st.view.phase != TaskPhase::Completed {
                return Err(OrchestratorError::NotCompleted);
            }
            let task_id = st
                .view
                .task_id()
                .map(str::to_string)
                .ok_or(OrchestratorError::NotCompleted)?;
            let (generation, use_cache) = (st.generation, st.use_cache);
            let slot = st
                .view
                .modules
                .iter_mut()
                .find(|m| m.module_type == module_type)
                .ok_or_else(|| OrchestratorError::UnknownModule(module_type.to_string()))?;
            if let ModuleState::Loaded(data) = &slot.state {
                return Ok(data.clone());
            }
            slot.state = ModuleState::Loading;
            (generation, task_id, use_cache)
        };

        let outcome = self.client.get_module(&task_id, module_type, use_cache).await;

        let mut st = self.inner.state();
        if st.generation == generation {
            if let Some(slot) = st
                .view
                .modules
                .iter_mut()
                .find(|m| m.module_type == module_type)
            {
                slot.state = match &outcome {
                    Ok(data) => ModuleState::Loaded(data.clone()),
                    Err(e) => ModuleState::Failed(e.user_message()),
                };
            }
        }
        if let Err(e) = &outcome {
            tracing::warn!("module {} of {} failed: {}", module_type, task_id, e);
        }
        outcome.map_err(Into::into)
    }

    /// Forget a module's previous outcome and load it again
    pub async fn retry_module(&self, module_type: &str) -> Result<Value, OrchestratorError> {
        {
            let mut st = self.inner.state();
            if let Some(slot) = st
                .view
                .modules
                .iter_mut()
                .find(|m| m.module_type == module_type)
            {
                slot.state = ModuleState::NotLoaded;
            }
        }
        self.load_module(module_type).await
    }
}

impl Drop for TaskOrchestrator {
    fn drop(&mut self) {
        if let Some(run) = self.lock_active().take() {
            run.scheduler.stop();
            run.handle.abort();
        }
    }
}
