//! Task and task-result types shared across the pipeline.

use serde::{Deserialize, Serialize};

use crate::verification::Claim;

/// Status of a task in the workflow graph.
///
/// Transitions are forward-only with a single sanctioned loop for rework:
/// `Completed -> Reworking -> Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies.
    Pending,
    /// Selected into the current stage.
    Staged,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an execution failure.
    Failed,
    /// Cancelled by the per-task timeout.
    TimedOut,
    /// Never started because an upstream dependency failed.
    Skipped,
    /// Re-attempting after a verification discrepancy.
    Reworking,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Skipped
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Staged)
                | (Pending, Skipped)
                | (Staged, Running)
                | (Staged, Skipped)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Completed, Reworking)
                | (Reworking, Running)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Staged => "staged",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
            Self::Reworking => "reworking",
        };
        write!(f, "{}", s)
    }
}

/// Candidate task contributed by an executor's planning entry point.
///
/// `depends_on` may reference ids contributed by other executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

/// A scheduled unit of work. Created by the graph builder, mutated only on
/// the scheduler coordinator's control-flow path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner_executor_id: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
}

impl Task {
    pub fn from_spec(spec: TaskSpec, owner_executor_id: impl Into<String>) -> Self {
        Self {
            id: spec.id,
            owner_executor_id: owner_executor_id.into(),
            description: spec.description,
            depends_on: spec.depends_on,
            status: TaskStatus::Pending,
        }
    }
}

/// Result of one task attempt. Append-only: a rework attempt produces a new
/// result, it never mutates an earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub output: String,
    #[serde(default)]
    pub artifacts: Vec<Claim>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl TaskResult {
    pub fn completed(task_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            output: output.into(),
            artifacts: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn failed(task_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            output: output.into(),
            artifacts: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn timed_out(task_id: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::TimedOut,
            output: format!("timed out after {}s", timeout_secs),
            artifacts: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn skipped(task_id: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Skipped,
            output: format!("skipped: upstream task {} did not complete", upstream.into()),
            artifacts: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Claim>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}
