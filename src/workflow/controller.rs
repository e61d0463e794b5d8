//! The workflow controller and its injected context.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{EventBus, EventType, WorkflowEvent};
use super::report::{FinalReport, TaskReport};
use super::{Workflow, WorkflowStatus};
use crate::adapter::ExecutionAdapter;
use crate::boundary::{Executor, FunctionalProbe, SecurityScanner, WorkItemSource};
use crate::config::{ForemanConfig, OrchestrateOptions};
use crate::error::{ForemanError, Result};
use crate::graph::TaskGraph;
use crate::planner::{Assignment, AssignmentPlanner};
use crate::registry::ExecutorRegistry;
use crate::scheduler::{ScheduleOptions, StageScheduler};
use crate::task::{Task, TaskResult, TaskStatus};
use crate::verification::{
    ReworkOrder, VerificationAuthority, VerificationRecord, VerificationState,
};
use crate::workitem::{SourceRef, WorkItem};

/// Everything the pipeline needs, injected explicitly; there is no
/// process-wide mutable state.
pub struct OrchestratorContext {
    pub registry: Arc<ExecutorRegistry>,
    pub planner: AssignmentPlanner,
    pub source: Arc<dyn WorkItemSource>,
    pub probe: Arc<dyn FunctionalProbe>,
    pub scanner: Arc<dyn SecurityScanner>,
    pub config: ForemanConfig,
    /// Root the verification authority resolves claimed paths under.
    pub working_dir: PathBuf,
}

/// Output of `plan`: the assignment plus the validated task graph preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedWorkflow {
    pub assignment: Assignment,
    pub tasks: Vec<Task>,
    pub stages: Vec<Vec<String>>,
}

pub struct WorkflowController {
    registry: Arc<ExecutorRegistry>,
    planner: AssignmentPlanner,
    source: Arc<dyn WorkItemSource>,
    adapter: Arc<ExecutionAdapter>,
    authority: VerificationAuthority,
    config: ForemanConfig,
    events: EventBus,
    /// Cancellation handles for in-flight orchestrations.
    active: RwLock<HashMap<String, CancellationToken>>,
}

impl WorkflowController {
    pub fn new(ctx: OrchestratorContext) -> Result<Self> {
        ctx.config.validate()?;
        let adapter = Arc::new(ExecutionAdapter::new(Arc::clone(&ctx.registry)));
        let authority = VerificationAuthority::new(
            Arc::clone(&ctx.registry),
            ctx.probe,
            ctx.scanner,
            ctx.config.verification.clone(),
            ctx.working_dir,
        );
        Ok(Self {
            registry: ctx.registry,
            planner: ctx.planner,
            source: ctx.source,
            adapter,
            authority,
            config: ctx.config,
            events: EventBus::default(),
            active: RwLock::new(HashMap::new()),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Discovery and assignment only; nothing executes.
    pub async fn analyze(&self, source_ref: &SourceRef) -> Result<Assignment> {
        self.registry.discover()?;
        let item = self.source.read_work_item(source_ref).await?;
        self.planner.assign(&item, &self.registry)
    }

    /// Analysis plus task graph construction; nothing executes.
    pub async fn plan(&self, source_ref: &SourceRef) -> Result<PlannedWorkflow> {
        self.registry.discover()?;
        let item = self.source.read_work_item(source_ref).await?;
        let assignment = self.planner.assign(&item, &self.registry)?;
        let executors = self.assigned_executors(&assignment)?;
        let graph = TaskGraph::build(&executors, &item).await?;

        Ok(PlannedWorkflow {
            assignment,
            stages: graph.planned_stages(),
            tasks: graph.tasks().cloned().collect(),
        })
    }

    /// The full pipeline: discover, assign, plan, execute, verify, approve.
    pub async fn orchestrate(
        &self,
        source_ref: &SourceRef,
        options: OrchestrateOptions,
    ) -> Result<FinalReport> {
        let workflow_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        self.active
            .write()
            .insert(workflow_id.clone(), cancel.clone());

        let outcome = self
            .run_pipeline(&workflow_id, source_ref, &options, &cancel)
            .await;
        self.active.write().remove(&workflow_id);

        if let Err(ForemanError::Cancelled(_)) = &outcome {
            self.events.emit(
                WorkflowEvent::new(EventType::WorkflowCompleted, &workflow_id)
                    .with_message(WorkflowStatus::Rejected.to_string()),
            );
        }
        outcome
    }

    /// Mark the workflow rejected and broadcast cancellation to in-flight
    /// tasks; new stages will not start.
    pub fn cancel(&self, workflow_id: &str) -> Result<()> {
        let active = self.active.read();
        let token = active
            .get(workflow_id)
            .ok_or_else(|| ForemanError::WorkflowNotFound(workflow_id.to_string()))?;
        info!(workflow_id = %workflow_id, "Cancelling workflow");
        token.cancel();
        Ok(())
    }

    async fn run_pipeline(
        &self,
        workflow_id: &str,
        source_ref: &SourceRef,
        options: &OrchestrateOptions,
        cancel: &CancellationToken,
    ) -> Result<FinalReport> {
        let started_at = Utc::now();
        let mut workflow = Workflow::new(workflow_id);

        info!(workflow_id = %workflow_id, source = %source_ref, "Workflow started");
        self.events
            .emit(WorkflowEvent::new(EventType::WorkflowStarted, workflow_id));

        workflow.status = WorkflowStatus::Discovering;
        self.registry.discover()?;

        workflow.status = WorkflowStatus::Assigning;
        let item = self.source.read_work_item(source_ref).await?;
        let assignment = self.planner.assign(&item, &self.registry)?;

        workflow.status = WorkflowStatus::Planning;
        let executors = self.assigned_executors(&assignment)?;
        let mut graph = TaskGraph::build(&executors, &item).await?;
        workflow.stages = graph.planned_stages();

        workflow.status = WorkflowStatus::Executing;
        let scheduler = StageScheduler::new(Arc::clone(&self.adapter), self.events.clone());
        let schedule_options =
            ScheduleOptions::new(options.concurrency_limit, options.per_task_timeout);
        let results = scheduler
            .run(workflow_id, &mut graph, &schedule_options, cancel)
            .await?;
        workflow.result_log.extend(results);

        workflow.status = WorkflowStatus::Verifying;
        let verification = self
            .verify_workflow(&mut workflow, &mut graph, options, cancel)
            .await?;

        let all_verified = graph.tasks().all(|task| {
            verification
                .states
                .get(&task.id)
                .is_some_and(|s| *s == VerificationState::Verified)
        });

        let approved = if all_verified {
            // The comprehensive probe is the final arbiter: even with zero
            // discrepancies, a failing environment rejects the workflow.
            match self.authority.final_probe(&item).await {
                Ok(report) if report.all_passed() => true,
                Ok(report) => {
                    warn!(
                        workflow_id = %workflow_id,
                        failed = report.failed_environments().len(),
                        "Final probe failed"
                    );
                    false
                }
                Err(e) => {
                    warn!(workflow_id = %workflow_id, error = %e, "Final probe errored");
                    false
                }
            }
        } else {
            false
        };

        workflow.status = if approved {
            WorkflowStatus::Approved
        } else {
            WorkflowStatus::Rejected
        };

        info!(workflow_id = %workflow_id, status = %workflow.status, "Workflow completed");
        self.events.emit(
            WorkflowEvent::new(EventType::WorkflowCompleted, workflow_id)
                .with_message(workflow.status.to_string()),
        );

        Ok(self.build_report(&workflow, &graph, &item, verification, approved, started_at))
    }

    /// Verify every completed task, granting at most `max_rework_cycles`
    /// re-attempts per discrepant task.
    async fn verify_workflow(
        &self,
        workflow: &mut Workflow,
        graph: &mut TaskGraph,
        options: &OrchestrateOptions,
        cancel: &CancellationToken,
    ) -> Result<WorkflowVerification> {
        let mut verification = WorkflowVerification::default();

        for task_id in graph.task_ids() {
            if cancel.is_cancelled() {
                return Err(ForemanError::Cancelled(format!(
                    "workflow {} cancelled during verification",
                    workflow.id
                )));
            }

            let status = graph.get(&task_id).expect("task exists").status;
            if status != TaskStatus::Completed {
                verification
                    .states
                    .insert(task_id.clone(), VerificationState::Unverified);
                continue;
            }

            let state = self
                .verify_task_with_rework(workflow, graph, &task_id, options, cancel, &mut verification)
                .await?;
            verification.states.insert(task_id, state);
        }

        Ok(verification)
    }

    async fn verify_task_with_rework(
        &self,
        workflow: &mut Workflow,
        graph: &mut TaskGraph,
        task_id: &str,
        options: &OrchestrateOptions,
        cancel: &CancellationToken,
        verification: &mut WorkflowVerification,
    ) -> Result<VerificationState> {
        let mut cycles = 0u32;

        loop {
            let task = graph.get(task_id).expect("task exists").clone();
            let result = workflow
                .latest_result(task_id)
                .cloned()
                .ok_or_else(|| ForemanError::Other(format!("no result for task {}", task_id)))?;

            let pass = self.authority.verify_task(&task, &result).await?;
            let verified = pass.verified();
            let discrepancies = pass.discrepancies();
            verification.records.extend(pass.records);

            self.events.emit(
                WorkflowEvent::new(EventType::VerificationResult, &workflow.id)
                    .with_task(task_id)
                    .with_message(if verified {
                        "verified".to_string()
                    } else {
                        format!("{} discrepancies", discrepancies.len())
                    }),
            );

            if verified {
                return Ok(VerificationState::Verified);
            }

            if cycles >= options.max_rework_cycles {
                warn!(task_id = %task_id, cycles, "Rework budget exhausted, rejecting");
                return Ok(VerificationState::Rejected);
            }
            cycles += 1;

            let order = self.authority.rework_order(task_id, discrepancies);
            debug!(
                task_id = %task_id,
                actions = order.required_actions.len(),
                "Issuing rework order"
            );
            verification.rework_orders.push(order);

            graph.mark(task_id, TaskStatus::Reworking)?;
            graph.mark(task_id, TaskStatus::Running)?;

            let task = graph.get(task_id).expect("task exists").clone();
            let child = cancel.child_token();
            let attempt =
                tokio::time::timeout(options.per_task_timeout, self.adapter.invoke(&task, &child))
                    .await;

            match attempt {
                Ok(Ok(result)) if result.is_success() => {
                    graph.mark(task_id, TaskStatus::Completed)?;
                    workflow.result_log.push(result);
                }
                Ok(Ok(result)) => {
                    graph.mark(task_id, TaskStatus::Failed)?;
                    workflow.result_log.push(result);
                    return Ok(VerificationState::Rejected);
                }
                Ok(Err(e)) => {
                    warn!(task_id = %task_id, error = %e, "Rework attempt failed");
                    graph.mark(task_id, TaskStatus::Failed)?;
                    workflow
                        .result_log
                        .push(TaskResult::failed(task_id, e.to_string()));
                    return Ok(VerificationState::Rejected);
                }
                Err(_) => {
                    child.cancel();
                    graph.mark(task_id, TaskStatus::TimedOut)?;
                    workflow.result_log.push(TaskResult::timed_out(
                        task_id,
                        options.per_task_timeout.as_secs(),
                    ));
                    return Ok(VerificationState::Rejected);
                }
            }
        }
    }

    fn build_report(
        &self,
        workflow: &Workflow,
        graph: &TaskGraph,
        item: &WorkItem,
        verification: WorkflowVerification,
        approved: bool,
        started_at: chrono::DateTime<Utc>,
    ) -> FinalReport {
        let tasks = graph
            .tasks()
            .map(|task| {
                let state = verification
                    .states
                    .get(&task.id)
                    .copied()
                    .unwrap_or(VerificationState::Unverified);
                let discrepancies = verification
                    .records
                    .iter()
                    .filter(|r| r.task_id == task.id)
                    .flat_map(|r| r.discrepancies.iter().cloned())
                    .collect();
                TaskReport {
                    task_id: task.id.clone(),
                    owner_executor_id: task.owner_executor_id.clone(),
                    status: task.status,
                    attempts: workflow.attempts(&task.id),
                    verification: state,
                    discrepancies,
                }
            })
            .collect();

        FinalReport {
            workflow_id: workflow.id.clone(),
            work_item_id: item.id.clone(),
            status: workflow.status,
            approved,
            tasks,
            verification_records: verification.records,
            rework_orders: verification.rework_orders,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn assigned_executors(&self, assignment: &Assignment) -> Result<Vec<Arc<dyn Executor>>> {
        assignment
            .executor_ids
            .iter()
            .map(|id| {
                self.registry
                    .get(id)
                    .ok_or_else(|| ForemanError::ExecutorNotFound(id.clone()))
            })
            .collect()
    }
}

/// Accumulated verification outcome across the workflow.
#[derive(Default)]
struct WorkflowVerification {
    states: HashMap<String, VerificationState>,
    records: Vec<VerificationRecord>,
    rework_orders: Vec<ReworkOrder>,
}
