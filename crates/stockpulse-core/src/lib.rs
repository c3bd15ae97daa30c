//! Shared task model, configuration and time source for stockpulse

mod clock;
mod config;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ApiSettings, CacheConfig, EndpointLimits, LimitPolicy, PollingConfig, RetrySettings,
    SessionConfig, Settings, API_URL_ENV,
};
pub use types::{
    ModuleDescriptor, ProgressSnapshot, SessionRecord, Task, TaskStatus, DEFAULT_MODULES,
};
