//! The backend as seen by the client: four request/response operations

use crate::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stockpulse_core::ProgressSnapshot;

/// Body of a task submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub company_name: String,
    pub analysis_type: String,
    pub force_refresh: bool,
}

impl SubmitRequest {
    pub fn new(company_name: impl Into<String>, analysis_type: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            analysis_type: analysis_type.into(),
            force_refresh: false,
        }
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Answer of the result endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum ResultFetch<T = Value> {
    Ready(T),
    /// The backend accepted the request but the result is not assembled yet (HTTP 202)
    Processing,
}

impl<T> ResultFetch<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            ResultFetch::Ready(value) => Some(value),
            ResultFetch::Processing => None,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, ResultFetch::Processing)
    }
}

/// One round trip per call; no retries, limits or caching at this layer
#[async_trait::async_trait]
pub trait TaskTransport: Send + Sync + 'static {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ApiError>;

    async fn progress(&self, task_id: &str) -> Result<ProgressSnapshot, ApiError>;

    async fn result(&self, task_id: &str) -> Result<ResultFetch, ApiError>;

    async fn module(&self, task_id: &str, module_type: &str) -> Result<Value, ApiError>;
}
