//! Configuration for the task client, poller and local stores

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the backend base URL
pub const API_URL_ENV: &str = "STOCKPULSE_API_URL";

/// Admission rule for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitPolicy {
    pub max_per_minute: u32,
    pub min_interval_ms: u64,
    pub cooldown_ms: u64,
}

impl LimitPolicy {
    pub fn new(max_per_minute: u32, min_interval_ms: u64, cooldown_ms: u64) -> Self {
        Self {
            max_per_minute,
            min_interval_ms,
            cooldown_ms,
        }
    }

    /// A policy that never throttles
    pub fn unlimited() -> Self {
        Self::new(u32::MAX, 0, 0)
    }
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self::new(60, 1_000, 10_000)
    }
}

/// Limits per backend endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointLimits {
    pub submit: LimitPolicy,
    pub status: LimitPolicy,
    pub result: LimitPolicy,
    pub module: LimitPolicy,
}

impl EndpointLimits {
    pub fn new() -> Self {
        Self {
            submit: LimitPolicy::new(60, 0, 10_000),
            status: LimitPolicy::new(120, 1_000, 5_000),
            result: LimitPolicy::new(30, 2_000, 10_000),
            module: LimitPolicy::new(60, 0, 10_000),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            submit: LimitPolicy::unlimited(),
            status: LimitPolicy::unlimited(),
            result: LimitPolicy::unlimited(),
            module: LimitPolicy::unlimited(),
        }
    }
}

impl Default for EndpointLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff for a single network call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl RetrySettings {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 300,
            multiplier: 2.0,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry: RetrySettings,
    pub limits: EndpointLimits,
    /// How long fetched results and modules stay cached
    pub result_ttl_ms: u64,
    /// Results larger than this are cached compressed
    pub compress_threshold_bytes: usize,
    /// Trim verbose result fields before caching
    pub optimize_results: bool,
}

impl ApiSettings {
    pub fn new() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout_ms: 30_000,
            retry: RetrySettings::new(),
            limits: EndpointLimits::new(),
            result_ttl_ms: 24 * 60 * 60 * 1000,
            compress_threshold_bytes: 100 * 1024,
            optimize_results: true,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_millis(self.result_ttl_ms)
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Adaptive polling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay before the first poll
    pub initial_delay_ms: u64,
    /// I0: shortest interval between polls
    pub base_interval_ms: u64,
    /// Imax: longest interval between polls
    pub max_interval_ms: u64,
    /// Interval growth after a transient failure
    pub backoff_multiplier: f64,
    /// Consecutive transient failures tolerated before giving up
    pub max_attempts: u32,
    /// Elapsed time at which the time factor saturates
    pub time_horizon_ms: u64,
    /// History entries used by the velocity estimate
    pub rate_window: usize,
    /// History entries retained
    pub history_capacity: usize,
    /// Quiet period after which the interval is shortened
    pub stall_after_ms: u64,
    /// Multiplier applied to the interval once stalled
    pub stall_shrink: f64,
    /// Smallest percentage change that counts as progress
    pub min_progress_delta: f64,
    /// Go back to I0 after a transient failure instead of backing off
    pub reset_on_error: bool,
}

impl PollingConfig {
    pub fn new() -> Self {
        Self {
            initial_delay_ms: 500,
            base_interval_ms: 3_000,
            max_interval_ms: 30_000,
            backoff_multiplier: 1.5,
            max_attempts: 10,
            time_horizon_ms: 2 * 60 * 1000,
            rate_window: 10,
            history_capacity: 30,
            stall_after_ms: 30_000,
            stall_shrink: 0.7,
            min_progress_delta: 5.0,
            reset_on_error: false,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.max(self.base_interval_ms))
    }

    pub fn time_horizon(&self) -> Duration {
        Duration::from_millis(self.time_horizon_ms)
    }

    pub fn stall_after(&self) -> Duration {
        Duration::from_millis(self.stall_after_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Local cache store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub prefix: String,
    pub default_ttl_ms: u64,
    /// Uncompressed writes above this size are upgraded to compressed
    pub auto_compress_bytes: usize,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self {
            prefix: "stock_analysis_cache".to_string(),
            default_ttl_ms: 30 * 60 * 1000,
            auto_compress_bytes: 500 * 1024,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Session store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Records older than this are treated as absent
    pub horizon_ms: u64,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            horizon_ms: 4 * 60 * 60 * 1000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level settings, loadable from a partial JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub polling: PollingConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub default_analysis_kind: String,
    /// Show smoothed progress while the backend is quiet
    pub smooth_progress: bool,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            api: ApiSettings::new(),
            polling: PollingConfig::new(),
            cache: CacheConfig::new(),
            session: SessionConfig::new(),
            default_analysis_kind: "comprehensive".to_string(),
            smooth_progress: false,
        }
    }

    /// Load settings from `path`, falling back to defaults when missing or malformed
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("cannot read settings {}: {}", path.display(), e);
                return Self::new();
            }
        };

        match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("ignoring malformed settings {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Apply environment overrides
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                self.api.base_url = url.trim_end_matches('/').to_string();
            }
        }
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
