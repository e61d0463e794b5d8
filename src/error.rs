use thiserror::Error;

use crate::verification::Discrepancy;

#[derive(Error, Debug)]
pub enum ForemanError {
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Assignment failed: {0}")]
    Assignment(String),

    #[error("Task {task_id} depends on unknown task: {missing}")]
    DanglingDependency { task_id: String, missing: String },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("Execution failed for task {task_id}: {cause}")]
    Execution { task_id: String, cause: String },

    #[error("Task {task_id} timed out after {timeout_secs}s")]
    Timeout { task_id: String, timeout_secs: u64 },

    #[error("Verification rejected task {task_id} after {attempts} attempts")]
    VerificationRejected {
        task_id: String,
        attempts: u32,
        discrepancies: Vec<Discrepancy>,
    },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Executor not found: {0}")]
    ExecutorNotFound(String),

    #[error("Boundary error: {0}")]
    Boundary(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl ForemanError {
    /// Errors local to a single task; the scheduler recovers from these by
    /// skipping dependents instead of aborting the workflow.
    pub fn is_task_local(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::Timeout { .. })
    }

    /// Errors that terminate the run before any task executes.
    pub fn is_workflow_fatal(&self) -> bool {
        matches!(
            self,
            Self::Discovery(_)
                | Self::Assignment(_)
                | Self::DanglingDependency { .. }
                | Self::DuplicateTask(_)
                | Self::CycleDetected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ForemanError>;
