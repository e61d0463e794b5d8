//! Stage scheduler: drives the task graph to a settled state.
//!
//! Stages execute strictly in sequence; tasks within a stage run
//! concurrently under a counting semaphore. Workers never touch the graph:
//! they report immutable outcomes over one mpsc queue and the coordinator
//! applies them one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::ExecutionAdapter;
use crate::error::{ForemanError, Result};
use crate::graph::TaskGraph;
use crate::task::{TaskResult, TaskStatus};
use crate::workflow::events::{EventBus, EventType, WorkflowEvent};

#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub concurrency_limit: usize,
    pub per_task_timeout: Duration,
}

impl ScheduleOptions {
    pub fn new(concurrency_limit: usize, per_task_timeout: Duration) -> Self {
        Self {
            concurrency_limit,
            per_task_timeout,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(ForemanError::Config(
                "concurrency_limit must be greater than 0".into(),
            ));
        }
        if self.per_task_timeout.is_zero() {
            return Err(ForemanError::Config(
                "per_task_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Message from a worker to the coordinator.
enum WorkerUpdate {
    Started { task_id: String },
    Finished { result: TaskResult },
    Errored { task_id: String, cause: String },
    TimedOut { task_id: String },
    Cancelled { task_id: String },
}

pub struct StageScheduler {
    adapter: Arc<ExecutionAdapter>,
    events: EventBus,
}

impl StageScheduler {
    pub fn new(adapter: Arc<ExecutionAdapter>, events: EventBus) -> Self {
        Self { adapter, events }
    }

    /// Run the graph to completion. Returns one result per task (including
    /// synthesized Skipped results) so the caller can enumerate every
    /// terminal status.
    pub async fn run(
        &self,
        workflow_id: &str,
        graph: &mut TaskGraph,
        options: &ScheduleOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskResult>> {
        options.validate()?;

        let semaphore = Arc::new(Semaphore::new(options.concurrency_limit));
        let mut results: Vec<TaskResult> = Vec::new();
        let mut stage_index = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(ForemanError::Cancelled(format!(
                    "workflow {} cancelled before stage {}",
                    workflow_id,
                    stage_index + 1
                )));
            }

            let stage = graph.next_stage();
            if stage.is_empty() {
                break;
            }
            stage_index += 1;

            info!(
                workflow_id = %workflow_id,
                stage = stage_index,
                tasks = stage.len(),
                "Stage started"
            );
            self.events.emit(
                WorkflowEvent::new(EventType::StageStarted, workflow_id)
                    .with_stage(stage_index)
                    .with_message(format!("{} tasks eligible", stage.len())),
            );

            self.run_stage(&stage, graph, options, cancel, &semaphore, &mut results, workflow_id)
                .await?;

            self.propagate_skips(&stage, graph, &mut results, workflow_id);
        }

        debug_assert!(graph.is_settled(), "scheduler left non-terminal tasks behind");
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        stage: &[String],
        graph: &mut TaskGraph,
        options: &ScheduleOptions,
        cancel: &CancellationToken,
        semaphore: &Arc<Semaphore>,
        results: &mut Vec<TaskResult>,
        workflow_id: &str,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<WorkerUpdate>(stage.len().max(1) * 2);

        for id in stage {
            graph.mark(id, TaskStatus::Staged)?;
            let task = graph
                .get(id)
                .expect("staged task exists in graph")
                .clone();
            let adapter = Arc::clone(&self.adapter);
            let sem = Arc::clone(semaphore);
            let tx = tx.clone();
            let parent = cancel.clone();
            let child = cancel.child_token();
            let timeout = options.per_task_timeout;

            tokio::spawn(async move {
                // The outer select watches the workflow token only; a
                // per-task timeout cancels just the child token, so it can
                // never be misreported as a workflow cancellation.
                let update = tokio::select! {
                    _ = parent.cancelled() => WorkerUpdate::Cancelled {
                        task_id: task.id.clone(),
                    },
                    update = async {
                        let _permit = match sem.acquire().await {
                            Ok(permit) => permit,
                            Err(_) => {
                                return WorkerUpdate::Cancelled { task_id: task.id.clone() };
                            }
                        };
                        let _ = tx
                            .send(WorkerUpdate::Started { task_id: task.id.clone() })
                            .await;
                        match tokio::time::timeout(timeout, adapter.invoke(&task, &child)).await {
                            Ok(Ok(result)) => WorkerUpdate::Finished { result },
                            Ok(Err(e)) => WorkerUpdate::Errored {
                                task_id: task.id.clone(),
                                cause: e.to_string(),
                            },
                            Err(_) => {
                                // The invoke future is already dropped; the
                                // child token tells the boundary to stop any
                                // detached work it spawned.
                                child.cancel();
                                WorkerUpdate::TimedOut { task_id: task.id.clone() }
                            }
                        }
                    } => update,
                };
                let _ = tx.send(update).await;
            });
        }
        drop(tx);

        // Single update queue: outcomes are applied to the graph one at a
        // time on this coordinator path, never from the workers.
        let mut pending = stage.len();
        while pending > 0 {
            let Some(update) = rx.recv().await else { break };
            match update {
                WorkerUpdate::Started { task_id } => {
                    graph.mark(&task_id, TaskStatus::Running)?;
                }
                WorkerUpdate::Finished { result } => {
                    pending -= 1;
                    let status = if result.is_success() {
                        TaskStatus::Completed
                    } else {
                        TaskStatus::Failed
                    };
                    graph.mark(&result.task_id, status)?;
                    self.emit_terminal(workflow_id, &result.task_id, status);
                    results.push(result);
                }
                WorkerUpdate::Errored { task_id, cause } => {
                    pending -= 1;
                    warn!(task_id = %task_id, cause = %cause, "Task failed");
                    graph.mark(&task_id, TaskStatus::Failed)?;
                    self.emit_terminal(workflow_id, &task_id, TaskStatus::Failed);
                    results.push(TaskResult::failed(&task_id, cause));
                }
                WorkerUpdate::TimedOut { task_id } => {
                    pending -= 1;
                    warn!(
                        task_id = %task_id,
                        timeout_secs = options.per_task_timeout.as_secs(),
                        "Task timed out"
                    );
                    graph.mark(&task_id, TaskStatus::TimedOut)?;
                    self.emit_terminal(workflow_id, &task_id, TaskStatus::TimedOut);
                    results.push(TaskResult::timed_out(
                        &task_id,
                        options.per_task_timeout.as_secs(),
                    ));
                }
                WorkerUpdate::Cancelled { task_id } => {
                    pending -= 1;
                    let status = graph.get(&task_id).map(|t| t.status);
                    match status {
                        Some(TaskStatus::Staged) => {
                            graph.mark(&task_id, TaskStatus::Skipped)?;
                            results.push(TaskResult::skipped(&task_id, "cancelled workflow"));
                        }
                        _ => {
                            graph.mark(&task_id, TaskStatus::Failed)?;
                            self.emit_terminal(workflow_id, &task_id, TaskStatus::Failed);
                            results.push(TaskResult::failed(&task_id, "cancelled"));
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(ForemanError::Cancelled(format!(
                "workflow {} cancelled during execution",
                workflow_id
            )));
        }
        Ok(())
    }

    /// Partial-failure semantics: everything downstream of a failed or
    /// timed-out task is skipped, unrelated tasks keep going.
    fn propagate_skips(
        &self,
        stage: &[String],
        graph: &mut TaskGraph,
        results: &mut Vec<TaskResult>,
        workflow_id: &str,
    ) {
        for id in stage {
            let failed = graph
                .get(id)
                .map(|t| t.status.is_failure())
                .unwrap_or(false);
            if !failed {
                continue;
            }
            for downstream_id in graph.downstream(id) {
                let is_pending = graph
                    .get(&downstream_id)
                    .map(|t| t.status == TaskStatus::Pending)
                    .unwrap_or(false);
                if is_pending {
                    debug!(
                        workflow_id = %workflow_id,
                        task_id = %downstream_id,
                        upstream = %id,
                        "Skipping downstream task"
                    );
                    let _ = graph.mark(&downstream_id, TaskStatus::Skipped);
                    results.push(TaskResult::skipped(&downstream_id, id.clone()));
                }
            }
        }
    }

    fn emit_terminal(&self, workflow_id: &str, task_id: &str, status: TaskStatus) {
        let event_type = if status == TaskStatus::Completed {
            EventType::TaskCompleted
        } else {
            EventType::TaskFailed
        };
        self.events.emit(
            WorkflowEvent::new(event_type, workflow_id)
                .with_task(task_id)
                .with_message(status.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::boundary::Executor;
    use crate::registry::{ExecutorDescriptor, ExecutorRegistry};
    use crate::task::{Task, TaskSpec};
    use crate::workitem::WorkItem;

    /// Executor whose per-task behavior is scripted by task id prefix:
    /// `ok-*` completes, `fail-*` errors, `slow-*` sleeps past the timeout.
    struct ScriptedExecutor {
        descriptor: ExecutorDescriptor,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self {
                descriptor: ExecutorDescriptor::new("exec", "worker"),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        fn descriptor(&self) -> &ExecutorDescriptor {
            &self.descriptor
        }

        async fn plan_tasks(&self, _item: &WorkItem) -> Result<Vec<TaskSpec>> {
            Ok(vec![])
        }

        async fn execute(&self, task: &Task, _cancel: &CancellationToken) -> Result<TaskResult> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let result = if task.id.starts_with("fail-") {
                Err(ForemanError::Boundary("scripted failure".into()))
            } else if task.id.starts_with("slow-") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(TaskResult::completed(&task.id, "eventually"))
            } else {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(TaskResult::completed(&task.id, "done"))
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn scheduler_with(executor: Arc<ScriptedExecutor>) -> StageScheduler {
        let registry = ExecutorRegistry::builder()
            .register(executor)
            .build()
            .unwrap();
        StageScheduler::new(
            Arc::new(ExecutionAdapter::new(Arc::new(registry))),
            EventBus::default(),
        )
    }

    fn graph_of(specs: Vec<TaskSpec>) -> TaskGraph {
        TaskGraph::from_tasks(
            specs
                .into_iter()
                .map(|s| Task::from_spec(s, "exec"))
                .collect(),
        )
        .unwrap()
    }

    fn options(limit: usize) -> ScheduleOptions {
        ScheduleOptions::new(limit, Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_tasks_run_concurrently() {
        let executor = Arc::new(ScriptedExecutor::new());
        let max_in_flight = Arc::clone(&executor.max_in_flight);
        let scheduler = scheduler_with(executor);

        let mut graph = graph_of(vec![
            TaskSpec::new("ok-1", "a"),
            TaskSpec::new("ok-2", "b"),
            TaskSpec::new("ok-3", "c"),
            TaskSpec::new("ok-4", "d"),
        ]);

        let start = tokio::time::Instant::now();
        let results = scheduler
            .run("wf", &mut graph, &options(4), &CancellationToken::new())
            .await
            .unwrap();

        // Four 50ms tasks under a limit of 4 finish in ~one task's time.
        assert!(start.elapsed() < Duration::from_millis(120));
        assert_eq!(results.len(), 4);
        assert!(max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_is_respected() {
        let executor = Arc::new(ScriptedExecutor::new());
        let max_in_flight = Arc::clone(&executor.max_in_flight);
        let scheduler = scheduler_with(executor);

        let mut graph = graph_of(vec![
            TaskSpec::new("ok-1", "a"),
            TaskSpec::new("ok-2", "b"),
            TaskSpec::new("ok-3", "c"),
            TaskSpec::new("ok-4", "d"),
        ]);

        scheduler
            .run("wf", &mut graph, &options(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependencies_execute_in_stage_order() {
        let scheduler = scheduler_with(Arc::new(ScriptedExecutor::new()));
        let mut graph = graph_of(vec![
            TaskSpec::new("ok-a", "first"),
            TaskSpec::new("ok-b", "second").with_depends_on(vec!["ok-a".into()]),
        ]);

        let results = scheduler
            .run("wf", &mut graph, &options(4), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["ok-a", "ok-b"]);
        assert_eq!(graph.get("ok-b").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_skips_downstream_only() {
        let scheduler = scheduler_with(Arc::new(ScriptedExecutor::new()));
        let mut graph = graph_of(vec![
            TaskSpec::new("fail-a", "breaks"),
            TaskSpec::new("ok-b", "depends on a").with_depends_on(vec!["fail-a".into()]),
            TaskSpec::new("ok-c", "independent"),
        ]);

        let results = scheduler
            .run("wf", &mut graph, &options(4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(graph.get("fail-a").unwrap().status, TaskStatus::Failed);
        assert_eq!(graph.get("ok-b").unwrap().status, TaskStatus::Skipped);
        assert_eq!(graph.get("ok-c").unwrap().status, TaskStatus::Completed);

        // Every task has exactly one terminal result.
        assert_eq!(results.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_task_timed_out() {
        let scheduler = scheduler_with(Arc::new(ScriptedExecutor::new()));
        let mut graph = graph_of(vec![
            TaskSpec::new("slow-a", "hangs"),
            TaskSpec::new("ok-b", "depends").with_depends_on(vec!["slow-a".into()]),
        ]);

        let results = scheduler
            .run(
                "wf",
                &mut graph,
                &ScheduleOptions::new(2, Duration::from_millis(200)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(graph.get("slow-a").unwrap().status, TaskStatus::TimedOut);
        assert_eq!(graph.get("ok-b").unwrap().status, TaskStatus::Skipped);
        assert_eq!(results.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_the_run() {
        let scheduler = scheduler_with(Arc::new(ScriptedExecutor::new()));
        let mut graph = graph_of(vec![TaskSpec::new("slow-a", "hangs")]);

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel_clone.cancel();
        });

        let err = scheduler
            .run("wf", &mut graph, &options(2), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ForemanError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let scheduler = scheduler_with(Arc::new(ScriptedExecutor::new()));
        let mut graph = graph_of(vec![TaskSpec::new("ok-a", "a")]);

        let err = scheduler
            .run(
                "wf",
                &mut graph,
                &ScheduleOptions::new(0, Duration::from_secs(1)),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ForemanError::Config(_)));
    }
}
