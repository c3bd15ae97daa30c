//! Shared helpers for client integration tests

#![allow(dead_code)]

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockpulse_client::{
    ApiError, ResultFetch, SubmitRequest, SubmitResponse, TaskApiClient, TaskTransport,
};
use stockpulse_core::{ApiSettings, CacheConfig, EndpointLimits, ManualClock, ProgressSnapshot};
use stockpulse_store::{CacheStore, MemoryStore};

/// Transport answering from queued responses, counting calls per endpoint
#[derive(Default)]
pub struct FakeTransport {
    submits: Mutex<VecDeque<Result<SubmitResponse, ApiError>>>,
    progress: Mutex<VecDeque<Result<ProgressSnapshot, ApiError>>>,
    results: Mutex<VecDeque<Result<ResultFetch, ApiError>>>,
    modules: Mutex<HashMap<String, Result<Value, ApiError>>>,
    pub latency: Mutex<Duration>,
    pub submit_calls: AtomicUsize,
    pub progress_calls: AtomicUsize,
    pub result_calls: AtomicUsize,
    pub module_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_submit(&self, response: Result<SubmitResponse, ApiError>) {
        self.submits.lock().unwrap().push_back(response);
    }

    pub fn accept_submit(&self, task_id: &str) {
        self.push_submit(Ok(SubmitResponse {
            success: true,
            task_id: Some(task_id.to_string()),
            message: "accepted".to_string(),
        }));
    }

    pub fn push_progress(&self, response: Result<ProgressSnapshot, ApiError>) {
        self.progress.lock().unwrap().push_back(response);
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

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn exhausted<T>() -> Result<T, ApiError> {
    Err(ApiError::Unknown("no scripted response".to_string()))
}

#[async_trait::async_trait]
impl TaskTransport for FakeTransport {
    async fn submit(&self, _request: &SubmitRequest) -> Result<SubmitResponse, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let next = self.submits.lock().unwrap().pop_front();
        next.unwrap_or_else(exhausted)
    }

    async fn progress(&self, _task_id: &str) -> Result<ProgressSnapshot, ApiError> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let next = self.progress.lock().unwrap().pop_front();
        next.unwrap_or_else(exhausted)
    }

    async fn result(&self, _task_id: &str) -> Result<ResultFetch, ApiError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let next = self.results.lock().unwrap().pop_front();
        next.unwrap_or_else(exhausted)
    }

    async fn module(&self, _task_id: &str, module_type: &str) -> Result<Value, ApiError> {
        self.module_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let found = self.modules.lock().unwrap().get(module_type).cloned();
        found.unwrap_or_else(exhausted)
    }
}

pub fn unlimited_settings() -> ApiSettings {
    ApiSettings {
        limits: EndpointLimits::unlimited(),
        ..ApiSettings::new()
    }
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<CacheStore>,
    pub client: TaskApiClient,
}

pub fn harness(settings: ApiSettings) -> Harness {
    let transport = FakeTransport::new();
    let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
    let cache = Arc::new(CacheStore::new(
        Arc::new(MemoryStore::new()),
        clock.clone(),
        CacheConfig::new(),
    ));
    let client = TaskApiClient::new(transport.clone(), cache.clone(), clock.clone(), settings);
    Harness {
        transport,
        clock,
        cache,
        client,
    }
}
