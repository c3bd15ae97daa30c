use crate::transport::{ResultFetch, SubmitRequest, SubmitResponse, TaskTransport};
use crate::ApiError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use stockpulse_core::ProgressSnapshot;

/// [`TaskTransport`] over the backend's HTTP API.
///
/// Paths are relative to `base_url`:
/// `POST /stock-analysis/task`, `GET /stock-analysis/progress/{id}`,
/// `GET /stock-analysis/result/{id}` and `GET /stock-analysis/result/{id}/{module}`.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/stock-analysis/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        request.send().await.map_err(map_reqwest_error)
    }

    /// Map an HTTP response, turning failure statuses into `ApiError`
    async fn parse<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), error_detail(&body)));
        }
        resp.json::<R>()
            .await
            .map_err(|e| ApiError::Decode(format!("response body: {}", e)))
    }
}

#[async_trait::async_trait]
impl TaskTransport for HttpTransport {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ApiError> {
        let resp = self.send(self.http.post(self.url("task")).json(request)).await?;
        Self::parse(resp).await
    }

    async fn progress(&self, task_id: &str) -> Result<ProgressSnapshot, ApiError> {
        let url = self.url(&format!("progress/{}", task_id));
        let resp = self.send(self.http.get(url)).await?;
        let snapshot: ProgressSnapshot = Self::parse(resp).await?;
        Ok(snapshot.normalized())
    }

    async fn result(&self, task_id: &str) -> Result<ResultFetch, ApiError> {
        let url = self.url(&format!("result/{}", task_id));
        let resp = self.send(self.http.get(url)).await?;
        if resp.status() == StatusCode::ACCEPTED {
            return Ok(ResultFetch::Processing);
        }
        Self::parse::<Value>(resp).await.map(ResultFetch::Ready)
    }

    async fn module(&self, task_id: &str, module_type: &str) -> Result<Value, ApiError> {
        let url = self.url(&format!("result/{}/{}", task_id, module_type));
        let resp = self.send(self.http.get(url)).await?;
        Self::parse(resp).await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(std::time::Duration::ZERO)
    } else if e.is_connect() || e.is_request() {
        ApiError::Connection(e.to_string())
    } else if e.is_decode() || e.is_body() {
        ApiError::Decode(e.to_string())
    } else {
        ApiError::Unknown(e.to_string())
    }
}

/// Error bodies look like `{"error": ...}` or `{"detail": ...}`; anything else is passed through
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "detail"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|d| d.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail() {
        assert_eq!(error_detail(r#"{"detail": "Task not found"}"#), "Task not found");
        assert_eq!(error_detail(r#"{"error": "Internal server error"}"#), "Internal server error");
        assert_eq!(error_detail("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:8000/api/v1/");
        assert_eq!(
            transport.url("progress/t-1"),
            "http://localhost:8000/api/v1/stock-analysis/progress/t-1"
        );
    }
}
