//! External boundary contracts.
//!
//! The core defines these traits but never implements them with real
//! backends: the work-item store, the executors' domain logic, the
//! functional probe, and the security scanner all live outside the crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::registry::ExecutorDescriptor;
use crate::task::{Task, TaskResult, TaskSpec};
use crate::verification::Claim;
use crate::workitem::{SourceRef, WorkItem};

/// External document store the controller reads work items from.
#[async_trait]
pub trait WorkItemSource: Send + Sync {
    async fn read_work_item(&self, source_ref: &SourceRef) -> Result<WorkItem>;
}

/// A pluggable unit of domain logic that plans and performs tasks for a role.
///
/// Execution may be backed by anything (including a remote invocation
/// service); the core treats it as opaque, possibly slow, possibly failing,
/// and always calls it under a timeout with a cooperative cancellation token.
#[async_trait]
pub trait Executor: Send + Sync {
    fn descriptor(&self) -> &ExecutorDescriptor;

    /// Contribute candidate tasks for a work item. `depends_on` ids may
    /// reference tasks contributed by other executors.
    async fn plan_tasks(&self, item: &WorkItem) -> Result<Vec<TaskSpec>>;

    /// Perform one task. Implementations should observe `cancel` at their
    /// own suspension points.
    async fn execute(&self, task: &Task, cancel: &CancellationToken) -> Result<TaskResult>;

    /// Second opinion on a peer's claim, solicited during consensus.
    async fn review_claim(&self, _claim: &Claim) -> Result<PeerOpinion> {
        Ok(PeerOpinion::agree("no objection"))
    }
}

/// A peer executor's verdict on another executor's claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerOpinion {
    pub agree: bool,
    pub evidence: String,
}

impl PeerOpinion {
    pub fn agree(evidence: impl Into<String>) -> Self {
        Self {
            agree: true,
            evidence: evidence.into(),
        }
    }

    pub fn disagree(evidence: impl Into<String>) -> Self {
        Self {
            agree: false,
            evidence: evidence.into(),
        }
    }
}

/// Cross-environment behavioral test runner.
#[async_trait]
pub trait FunctionalProbe: Send + Sync {
    async fn probe(&self, claim: &Claim, environments: &[String]) -> Result<ProbeReport>;
}

/// Result of probing a claim across environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub environments: Vec<EnvironmentResult>,
    /// Measured value for performance claims, when the probe captured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_value: Option<f64>,
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl ProbeReport {
    pub fn passing(environments: &[String]) -> Self {
        Self {
            environments: environments
                .iter()
                .map(|e| EnvironmentResult::pass(e))
                .collect(),
            measured_value: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_measured_value(mut self, value: f64) -> Self {
        self.measured_value = Some(value);
        self
    }

    pub fn all_passed(&self) -> bool {
        !self.environments.is_empty() && self.environments.iter().all(|e| e.passed)
    }

    pub fn failed_environments(&self) -> Vec<&EnvironmentResult> {
        self.environments.iter().filter(|e| !e.passed).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentResult {
    pub environment: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl EnvironmentResult {
    pub fn pass(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            passed: true,
            detail: None,
        }
    }

    pub fn fail(environment: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// External security scan boundary.
#[async_trait]
pub trait SecurityScanner: Send + Sync {
    async fn scan(&self, claim: &Claim) -> Result<Vec<SecurityFinding>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub severity: FindingSeverity,
    pub description: String,
    /// Open findings block verification; resolved ones are informational.
    pub open: bool,
}

impl SecurityFinding {
    pub fn open(severity: FindingSeverity, description: impl Into<String>) -> Self {
        Self {
            severity,
            description: description.into(),
            open: true,
        }
    }

    pub fn resolved(severity: FindingSeverity, description: impl Into<String>) -> Self {
        Self {
            severity,
            description: description.into(),
            open: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_report_pass_fail() {
        let envs = vec!["dev".to_string(), "staging".to_string()];
        let passing = ProbeReport::passing(&envs);
        assert!(passing.all_passed());
        assert!(passing.failed_environments().is_empty());

        let mut mixed = ProbeReport::passing(&envs);
        mixed.environments[1] = EnvironmentResult::fail("staging", "500 on login");
        assert!(!mixed.all_passed());
        assert_eq!(mixed.failed_environments().len(), 1);
    }

    #[test]
    fn test_empty_probe_report_does_not_pass() {
        let report = ProbeReport {
            environments: Vec::new(),
            measured_value: None,
            diagnostics: Vec::new(),
        };
        assert!(!report.all_passed());
    }

    #[test]
    fn test_finding_severity_ordering() {
        assert!(FindingSeverity::Low < FindingSeverity::Critical);
        assert!(FindingSeverity::Medium < FindingSeverity::High);
    }
}
