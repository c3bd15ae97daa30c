//! Task API client for the stock analysis backend
//!
//! [`TaskApiClient`] layers admission control, timeouts, retries, request
//! de-duplication and result caching over a [`TaskTransport`].
//! [`HttpTransport`] is the production transport.

mod api;
mod error;
mod http;
pub mod limiter;
pub mod optimize;
pub mod retry;
mod transport;

pub use api::{module_cache_key, result_cache_key, TaskApiClient, TaskResult};
pub use error::{ApiError, ErrorKind};
pub use http::HttpTransport;
pub use limiter::{Endpoint, LimiterStatus, RequestLimiter};
pub use retry::RetryPolicy;
pub use transport::{ResultFetch, SubmitRequest, SubmitResponse, TaskTransport};
