//! Task tracking: adaptive status polling and the orchestrator the UI talks to

pub mod history;
pub mod interval;
mod orchestrator;
mod scheduler;
pub mod smoothing;

pub use history::{HistoryEntry, PollingHistory};
pub use interval::{backoff_interval, next_interval, IntervalInputs};
pub use orchestrator::{
    ModuleSlot, ModuleState, OrchestratorError, TaskOrchestrator, TaskPhase, TaskView,
};
pub use scheduler::{
    FailureReason, NoopObserver, PollObserver, PollOutcome, PollStep, PollingScheduler,
    SchedulerPhase,
};
pub use smoothing::ProgressSmoother;
