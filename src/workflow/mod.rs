//! Workflow controller: façade over the orchestration pipeline.

mod controller;
pub mod events;
mod report;

pub use controller::{OrchestratorContext, PlannedWorkflow, WorkflowController};
pub use events::{EventBus, EventType, WorkflowEvent};
pub use report::{FinalReport, TaskReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskResult;

/// Lifecycle phase of one orchestration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Discovering,
    Assigning,
    Planning,
    Executing,
    Verifying,
    Approved,
    Rejected,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Discovering => "discovering",
            Self::Assigning => "assigning",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// State for one orchestration call. Owned by the controller; exists for the
/// lifetime of the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub status: WorkflowStatus,
    /// Planned topological stages (task ids).
    pub stages: Vec<Vec<String>>,
    /// Immutable, append-only log of every task attempt.
    pub result_log: Vec<TaskResult>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: WorkflowStatus::Created,
            stages: Vec::new(),
            result_log: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Results are appended, never replaced; the latest attempt for a task
    /// is the last log entry bearing its id.
    pub fn latest_result(&self, task_id: &str) -> Option<&TaskResult> {
        self.result_log.iter().rev().find(|r| r.task_id == task_id)
    }

    /// Execution attempts for a task; synthesized Skipped entries are not
    /// attempts.
    pub fn attempts(&self, task_id: &str) -> u32 {
        self.result_log
            .iter()
            .filter(|r| r.task_id == task_id && r.status != crate::task::TaskStatus::Skipped)
            .count() as u32
    }
}
