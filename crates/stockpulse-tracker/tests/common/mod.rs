//! Scripted backend and wiring shared by tracker integration tests

#![allow(dead_code)]

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockpulse_client::{
    ApiError, ResultFetch, SubmitRequest, SubmitResponse, TaskApiClient, TaskTransport,
};
use stockpulse_core::{
    ApiSettings, CacheConfig, EndpointLimits, ManualClock, PollingConfig, ProgressSnapshot,
    RetrySettings, SessionConfig, TaskStatus,
};
use stockpulse_store::{CacheStore, MemoryStore, SessionStore};
use stockpulse_tracker::{PollingScheduler, TaskOrchestrator};

#[derive(Default)]
pub struct ScriptedTransport {
    submits: Mutex<VecDeque<Result<SubmitResponse, ApiError>>>,
    progress: Mutex<VecDeque<Result<ProgressSnapshot, ApiError>>>,
    results: Mutex<VecDeque<Result<ResultFetch, ApiError>>>,
    modules: Mutex<HashMap<String, Result<Value, ApiError>>>,
    latency: Mutex<Duration>,
    pub submit_calls: AtomicUsize,
    pub progress_calls: AtomicUsize,
    pub result_calls: AtomicUsize,
    pub module_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn accept_submit(&self, task_id: &str) {
        self.submits.lock().unwrap().push_back(Ok(SubmitResponse {
            success: true,
            task_id: Some(task_id.to_string()),
            message: String::new(),
        }));
    }

    pub fn fail_submit(&self, error: ApiError) {
        self.submits.lock().unwrap().push_back(Err(error));
    }

    pub fn push_progress(&self, response: Result<ProgressSnapshot, ApiError>) {
        self.progress.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, status: TaskStatus, progress: f64) {
        self.push_progress(Ok(ProgressSnapshot::new(status, progress)));
    }

    pub fn push_result(&self, response: Result<ResultFetch, ApiError>) {
        self.results.lock().unwrap().push_back(response);
    }

    pub fn set_module(&self, module_type: &str, response: Result<Value, ApiError>) {
        self.modules
            .lock()
            .unwrap()
            .insert(module_type.to_string(), response);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn unscripted<T>() -> Result<T, ApiError> {
    Err(ApiError::Unknown("no scripted response".to_string()))
}

#[async_trait::async_trait]
impl TaskTransport for ScriptedTransport {
    async fn submit(&self, _request: &SubmitRequest) -> Result<SubmitResponse, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let next = self.submits.lock().unwrap().pop_front();
        next.unwrap_or_else(unscripted)
    }

    async fn progress(&self, _task_id: &str) -> Result<ProgressSnapshot, ApiError> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let next = self.progress.lock().unwrap().pop_front();
        next.unwrap_or_else(unscripted)
    }

    async fn result(&self, _task_id: &str) -> Result<ResultFetch, ApiError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let next = self.results.lock().unwrap().pop_front();
        next.unwrap_or_else(unscripted)
    }

    async fn module(&self, _task_id: &str, module_type: &str) -> Result<Value, ApiError> {
        self.module_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let found = self.modules.lock().unwrap().get(module_type).cloned();
        found.unwrap_or_else(unscripted)
    }
}

/// No throttling and a single attempt per call, so every scripted response maps to one poll
pub fn test_api_settings() -> ApiSettings {
    ApiSettings {
        limits: EndpointLimits::unlimited(),
        retry: RetrySettings {
            max_attempts: 1,
            ..RetrySettings::new()
        },
        ..ApiSettings::new()
    }
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<CacheStore>,
    pub sessions: Arc<SessionStore>,
    pub client: TaskApiClient,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_api_settings())
    }

    pub fn with_settings(settings: ApiSettings) -> Self {
        let transport = Arc::new(ScriptedTransport::default());
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let kv = Arc::new(MemoryStore::new());
        let cache = Arc::new(CacheStore::new(kv.clone(), clock.clone(), CacheConfig::new()));
        let sessions = Arc::new(SessionStore::new(kv, clock.clone(), SessionConfig::new()));
        let client = TaskApiClient::new(transport.clone(), cache.clone(), clock.clone(), settings);
        Self {
            transport,
            clock,
            cache,
            sessions,
            client,
        }
    }

    pub fn orchestrator(&self) -> TaskOrchestrator {
        TaskOrchestrator::new(
            self.client.clone(),
            self.sessions.clone(),
            self.clock.clone(),
            PollingConfig::new(),
        )
    }

    pub fn orchestrator_with(&self, polling: PollingConfig) -> TaskOrchestrator {
        TaskOrchestrator::new(
            self.client.clone(),
            self.sessions.clone(),
            self.clock.clone(),
            polling,
        )
    }

    /// A scheduler already in the polling phase, ready for manual ticks
    pub fn scheduler(&self, task_id: &str, polling: PollingConfig) -> PollingScheduler {
        let scheduler = PollingScheduler::new(self.client.clone(), task_id, polling);
        scheduler.restart();
        scheduler
    }
}
