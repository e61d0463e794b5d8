//! Final report: every task's terminal status, never a bare boolean.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::WorkflowStatus;
use crate::task::TaskStatus;
use crate::verification::{Discrepancy, ReworkOrder, VerificationRecord, VerificationState};

/// Per-task terminal outcome, including verification findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub owner_executor_id: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub verification: VerificationState,
    #[serde(default)]
    pub discrepancies: Vec<Discrepancy>,
}

/// User-visible outcome of one orchestration call.
///
/// Enumerates every task and every discrepancy even on partial success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub workflow_id: String,
    pub work_item_id: String,
    pub status: WorkflowStatus,
    pub approved: bool,
    pub tasks: Vec<TaskReport>,
    /// Full verification history, retained for audit.
    #[serde(default)]
    pub verification_records: Vec<VerificationRecord>,
    #[serde(default)]
    pub rework_orders: Vec<ReworkOrder>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FinalReport {
    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    pub fn all_discrepancies(&self) -> Vec<&Discrepancy> {
        self.tasks.iter().flat_map(|t| t.discrepancies.iter()).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "workflow {} {}: {}/{} tasks completed, {} discrepancies, {} rework orders",
            self.workflow_id,
            self.status,
            self.completed_count(),
            self.tasks.len(),
            self.all_discrepancies().len(),
            self.rework_orders.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(tasks: Vec<TaskReport>) -> FinalReport {
        FinalReport {
            workflow_id: "wf-1".into(),
            work_item_id: "wi-1".into(),
            status: WorkflowStatus::Rejected,
            approved: false,
            tasks,
            verification_records: vec![],
            rework_orders: vec![],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_enumerates_counts() {
        let report = report_with(vec![
            TaskReport {
                task_id: "a".into(),
                owner_executor_id: "e".into(),
                status: TaskStatus::Completed,
                attempts: 1,
                verification: VerificationState::Verified,
                discrepancies: vec![],
            },
            TaskReport {
                task_id: "b".into(),
                owner_executor_id: "e".into(),
                status: TaskStatus::Skipped,
                attempts: 0,
                verification: VerificationState::Unverified,
                discrepancies: vec![],
            },
        ]);

        assert_eq!(report.completed_count(), 1);
        assert!(report.summary().contains("1/2 tasks completed"));
        assert!(report.task("b").is_some());
    }
}
