//! Task, progress and session types shared by every stockpulse crate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Module types assumed when a result does not list its own modules
pub const DEFAULT_MODULES: &[&str] = &[
    "basic_info",
    "market_data",
    "financial_data",
    "research_data",
    "visualizations",
    "report",
];

/// Backend task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[serde(alias = "PENDING", alias = "Pending")]
    Pending,
    #[serde(alias = "RUNNING", alias = "Running", alias = "processing", alias = "PROCESSING")]
    Running,
    #[serde(alias = "COMPLETED", alias = "Completed")]
    Completed,
    #[serde(alias = "FAILED", alias = "Failed")]
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status poll as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: TaskStatus,
    /// Percentage in 0..=100
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Backend timestamps are passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(status: TaskStatus, progress: f64) -> Self {
        Self {
            status,
            progress: progress.clamp(0.0, 100.0),
            stage: String::new(),
            message: String::new(),
            error: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Clamp the percentage into range and pin completed tasks to 100
    pub fn normalized(mut self) -> Self {
        self.progress = if self.progress.is_finite() {
            self.progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        if self.status == TaskStatus::Completed {
            self.progress = 100.0;
        }
        self
    }
}

/// A backend analysis job known to this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subject: String,
    pub analysis_kind: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        analysis_kind: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            analysis_kind: analysis_kind.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// The last task started for a subject, persisted so tracking survives a restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub task_id: String,
    pub subject: String,
    pub analysis_kind: String,
    /// Milliseconds since the Unix epoch
    pub stored_at: i64,
}

impl SessionRecord {
    pub fn new(
        task_id: impl Into<String>,
        subject: impl Into<String>,
        analysis_kind: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            subject: subject.into(),
            analysis_kind: analysis_kind.into(),
            stored_at: now.timestamp_millis(),
        }
    }

    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.stored_at
    }
}

/// One lazily loadable slice of a task result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    #[serde(rename = "type")]
    pub module_type: String,
    #[serde(default)]
    pub endpoint: String,
}

impl ModuleDescriptor {
    pub fn new(module_type: impl Into<String>) -> Self {
        Self {
            module_type: module_type.into(),
            endpoint: String::new(),
        }
    }

    /// Module list declared by a result payload, or the defaults when absent
    pub fn from_result(result: &serde_json::Value) -> Vec<ModuleDescriptor> {
        let declared: Vec<ModuleDescriptor> = result
            .get("modules")
            .and_then(|m| m.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        if declared.is_empty() {
            DEFAULT_MODULES
                .iter()
                .map(|m| ModuleDescriptor::new(*m))
                .collect()
        } else {
            declared
        }
    }
}
