use crate::limiter::{Endpoint, RequestLimiter};
use crate::optimize::optimize_result;
use crate::retry::RetryPolicy;
use crate::transport::{ResultFetch, SubmitRequest, TaskTransport};
use crate::ApiError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use stockpulse_core::{ApiSettings, Clock, LimitPolicy, ProgressSnapshot};
use stockpulse_store::{CacheOptions, CacheStore};

type SharedCall<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

/// A fetched task result
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub data: Value,
    /// Served from the local cache without a network call
    pub from_cache: bool,
}

pub fn result_cache_key(task_id: &str) -> String {
    format!("task_result_{}", task_id)
}

pub fn module_cache_key(task_id: &str, module_type: &str) -> String {
    format!("task_module_{}_{}", task_id, module_type)
}

/// Task API client: submit, status, result and module loads, each behind the
/// request limiter, a per-attempt timeout and the retry policy.
///
/// Cloning is cheap and clones share limiter counters and in-flight requests.
#[derive(Clone)]
pub struct TaskApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn TaskTransport>,
    limiter: RequestLimiter,
    cache: Arc<CacheStore>,
    settings: ApiSettings,
    retry: RetryPolicy,
    inflight_submits: Mutex<HashMap<SubmitRequest, SharedCall<String>>>,
    inflight_modules: Mutex<HashMap<(String, String), SharedCall<Value>>>,
}

impl TaskApiClient {
    pub fn new(
        transport: Arc<dyn TaskTransport>,
        cache: Arc<CacheStore>,
        clock: Arc<dyn Clock>,
        settings: ApiSettings,
    ) -> Self {
        let retry = RetryPolicy::from_settings(&settings.retry);
        Self {
            inner: Arc::new(ClientInner {
                transport,
                limiter: RequestLimiter::new(clock),
                cache,
                settings,
                retry,
                inflight_submits: Mutex::new(HashMap::new()),
                inflight_modules: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.inner.settings
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.inner.cache
    }

    pub fn limiter(&self) -> &RequestLimiter {
        &self.inner.limiter
    }

    /// Start a backend analysis and return its task id.
    ///
    /// Identical concurrent submissions share one request.
    pub async fn submit(
        &self,
        subject: &str,
        analysis_kind: &str,
        force_refresh: bool,
    ) -> Result<String, ApiError> {
        let request = SubmitRequest::new(subject, analysis_kind).force_refresh(force_refresh);
        let inner = self.inner.clone();
        let owned = request.clone();
        dedup(&self.inner.inflight_submits, request, move || {
            async move { inner.submit_once(owned).await }.boxed()
        })
        .await
    }

    pub async fn get_status(&self, task_id: &str) -> Result<ProgressSnapshot, ApiError> {
        let inner = &self.inner;
        inner
            .call(Endpoint::Status, "status", || inner.transport.progress(task_id))
            .await
    }

    /// Fetch the final result, from the cache when allowed.
    ///
    /// A fresh result is trimmed and cached; the backend answering "still
    /// processing" yields [`ResultFetch::Processing`].
    pub async fn get_result(
        &self,
        task_id: &str,
        use_cache: bool,
    ) -> Result<ResultFetch<TaskResult>, ApiError> {
        let inner = &self.inner;
        let key = result_cache_key(task_id);

        if use_cache {
            if let Some(data) = inner.cache.get::<Value>(&key) {
                tracing::debug!("result for {} served from cache", task_id);
                return Ok(ResultFetch::Ready(TaskResult {
                    data,
                    from_cache: true,
                }));
            }
        }

        let fetched = inner
            .call(Endpoint::Result, "result", || inner.transport.result(task_id))
            .await?;
        let data = match fetched {
            ResultFetch::Ready(data) => data,
            ResultFetch::Processing => return Ok(ResultFetch::Processing),
        };

        let data = if inner.settings.optimize_results {
            optimize_result(data)
        } else {
            data
        };
        inner.store(&key, &data);

        Ok(ResultFetch::Ready(TaskResult {
            data,
            from_cache: false,
        }))
    }

    /// Fetch one module of a result. Concurrent loads of the same module share one request.
    pub async fn get_module(
        &self,
        task_id: &str,
        module_type: &str,
        use_cache: bool,
    ) -> Result<Value, ApiError> {
        let key = module_cache_key(task_id, module_type);
        if use_cache {
            if let Some(data) = self.inner.cache.get::<Value>(&key) {
                return Ok(data);
            }
        }

        let inner = self.inner.clone();
        let (task_id, module_type) = (task_id.to_string(), module_type.to_string());
        let dedup_key = (task_id.clone(), module_type.clone());
        dedup(&self.inner.inflight_modules, dedup_key, move || {
            async move {
                let data = inner
                    .call(Endpoint::Module, "module", || {
                        inner.transport.module(&task_id, &module_type)
                    })
                    .await?;
                inner.store(&key, &data);
                Ok(data)
            }
            .boxed()
        })
        .await
    }
}

impl ClientInner {
    fn policy(&self, endpoint: Endpoint) -> LimitPolicy {
        let limits = &self.settings.limits;
        match endpoint {
            Endpoint::Submit => limits.submit,
            Endpoint::Status => limits.status,
            Endpoint::Result => limits.result,
            Endpoint::Module => limits.module,
        }
    }

    /// Wait out a throttle once, then let the call through
    async fn admit(&self, endpoint: Endpoint) {
        let policy = self.policy(endpoint);
        if !self.limiter.should_throttle(endpoint, &policy) {
            return;
        }
        let wait = self.limiter.wait_hint(endpoint, &policy);
        tracing::debug!("{} throttled, waiting {:?}", endpoint, wait);
        tokio::time::sleep(wait).await;
        if self.limiter.should_throttle(endpoint, &policy) {
            tracing::debug!("{} still throttled, proceeding anyway", endpoint);
        }
    }

    async fn call<T, F, Fut>(&self, endpoint: Endpoint, label: &str, op: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let timeout = self.settings.timeout();
        self.retry
            .run(label, || {
                let attempt = op();
                async move {
                    self.admit(endpoint).await;
                    match tokio::time::timeout(timeout, attempt).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ApiError::Timeout(timeout)),
                    }
                }
            })
            .await
    }

    async fn submit_once(&self, request: SubmitRequest) -> Result<String, ApiError> {
        let response = self
            .call(Endpoint::Submit, "submit", || self.transport.submit(&request))
            .await
            .map_err(|e| match e {
                ApiError::Client { message, .. } => ApiError::Submission(message),
                other => other,
            })?;

        if !response.success {
            let reason = if response.message.is_empty() {
                "backend rejected the request".to_string()
            } else {
                response.message
            };
            return Err(ApiError::Submission(reason));
        }

        match response.task_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                tracing::info!("submitted analysis for {}: task {}", request.company_name, id);
                Ok(id)
            }
            None => Err(ApiError::Submission("response carried no task id".to_string())),
        }
    }

    /// Cache a fetched payload; a cache failure never fails the fetch
    fn store(&self, key: &str, data: &Value) {
        let size = serde_json::to_string(data).map(|s| s.len()).unwrap_or(0);
        let compress = size > self.settings.compress_threshold_bytes;
        let options = CacheOptions::ttl(self.settings.result_ttl()).compressed(compress);
        if let Err(e) = self.cache.set(key, data, options) {
            tracing::warn!("failed to cache {}: {}", key, e);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Join an in-flight call for `key`, or start one with `start`
async fn dedup<K, T, F>(
    inflight: &Mutex<HashMap<K, SharedCall<T>>>,
    key: K,
    start: F,
) -> Result<T, ApiError>
where
    K: Eq + Hash + Clone,
    T: Clone,
    F: FnOnce() -> BoxFuture<'static, Result<T, ApiError>>,
{
    let call = {
        let mut map = lock(inflight);
        match map.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                let call = start().shared();
                map.insert(key.clone(), call.clone());
                call
            }
        }
    };

    let outcome = call.clone().await;

    let mut map = lock(inflight);
    if map.get(&key).is_some_and(|current| current.ptr_eq(&call)) {
        map.remove(&key);
    }
    outcome
}
