use std::time::Duration;

/// Coarse classification used for retry and session decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Timeout,
    ServerError,
    NotFound,
    Authentication,
    Unknown,
}

/// Failure of a backend call. `Clone` so one in-flight call can answer several waiters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication rejected (HTTP {status})")]
    Authentication { status: u16 },

    #[error("request rejected (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    #[error("decode: {0}")]
    Decode(String),

    #[error("submission rejected: {0}")]
    Submission(String),

    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    /// Classify an HTTP failure status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ApiError::Authentication { status },
            404 => ApiError::NotFound(message),
            408 => ApiError::Timeout(Duration::ZERO),
            500..=599 => ApiError::Server { status, message },
            400..=499 => ApiError::Client { status, message },
            _ => ApiError::Unknown(format!("unexpected HTTP {}: {}", status, message)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Connection(_) => ErrorKind::Connection,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::Server { .. } => ErrorKind::ServerError,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Authentication { .. } => ErrorKind::Authentication,
            ApiError::Client { .. }
            | ApiError::Decode(_)
            | ApiError::Submission(_)
            | ApiError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::ServerError
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Text safe to show to a user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Connection(_) => {
                "Cannot reach the analysis service. Check your network connection.".to_string()
            }
            ApiError::Timeout(_) => "The analysis service took too long to answer.".to_string(),
            ApiError::Server { status, .. } => format!(
                "The analysis service is having trouble (HTTP {}). Try again later.",
                status
            ),
            ApiError::NotFound(_) => "The analysis task has expired or no longer exists.".to_string(),
            ApiError::Authentication { .. } => {
                "Not authorized to use the analysis service.".to_string()
            }
            ApiError::Submission(reason) => format!("Could not start the analysis: {}", reason),
            ApiError::Client { .. } | ApiError::Decode(_) | ApiError::Unknown(_) => {
                "Unexpected error while talking to the analysis service.".to_string()
            }
        }
    }
}
