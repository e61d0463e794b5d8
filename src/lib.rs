//! Foreman coordinates independent work units through a multi-phase
//! pipeline: discover executors, assign a subset to a work item, build a
//! task DAG from executor contributions, execute it under bounded
//! concurrency, then independently verify every claimed result before
//! approving the workflow.

pub mod adapter;
pub mod boundary;
pub mod config;
pub mod error;
pub mod graph;
pub mod planner;
pub mod registry;
pub mod scheduler;
pub mod task;
pub mod verification;
pub mod workflow;
pub mod workitem;

pub use adapter::ExecutionAdapter;
pub use boundary::{
    EnvironmentResult, Executor, FindingSeverity, FunctionalProbe, PeerOpinion, ProbeReport,
    SecurityFinding, SecurityScanner, WorkItemSource,
};
pub use config::{ForemanConfig, OrchestrateOptions, OrchestratorConfig, VerificationConfig};
pub use error::{ForemanError, Result};
pub use graph::TaskGraph;
pub use planner::{Assignment, AssignmentPlanner, AssignmentRule, RuleMatcher};
pub use registry::{ExecutorDescriptor, ExecutorRegistry, RegistryBuilder};
pub use scheduler::{ScheduleOptions, StageScheduler};
pub use task::{Task, TaskResult, TaskSpec, TaskStatus};
pub use verification::{
    Claim, ClaimKind, Discrepancy, Evidence, EvidenceSource, ReworkOrder, TaskVerification,
    VerificationAuthority, VerificationRecord, VerificationState,
};
pub use workflow::{
    EventBus, EventType, FinalReport, OrchestratorContext, PlannedWorkflow, TaskReport, Workflow,
    WorkflowController, WorkflowEvent, WorkflowStatus,
};
pub use workitem::{SourceRef, WorkItem, WorkItemMetadata};
