//! Execution adapter: uniform call contract into the executor boundary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ForemanError, Result};
use crate::registry::ExecutorRegistry;
use crate::task::{Task, TaskResult};

/// Translates scheduler task invocations into executor boundary calls and
/// normalizes every failure shape into `ForemanError::Execution`.
pub struct ExecutionAdapter {
    registry: Arc<ExecutorRegistry>,
}

impl ExecutionAdapter {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    /// Invoke the owning executor for `task`.
    ///
    /// The caller owns timeout handling; the cancellation token is forwarded
    /// so the boundary can stop cooperatively.
    pub async fn invoke(&self, task: &Task, cancel: &CancellationToken) -> Result<TaskResult> {
        let executor = self
            .registry
            .get(&task.owner_executor_id)
            .ok_or_else(|| ForemanError::ExecutorNotFound(task.owner_executor_id.clone()))?;

        debug!(task_id = %task.id, executor = %task.owner_executor_id, "Invoking executor");

        let result = executor
            .execute(task, cancel)
            .await
            .map_err(|e| ForemanError::Execution {
                task_id: task.id.clone(),
                cause: e.to_string(),
            })?;

        if result.task_id != task.id {
            warn!(
                task_id = %task.id,
                reported = %result.task_id,
                "Executor returned a result for the wrong task"
            );
            return Err(ForemanError::Execution {
                task_id: task.id.clone(),
                cause: format!("executor reported result for task {}", result.task_id),
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::boundary::Executor;
    use crate::registry::ExecutorDescriptor;
    use crate::task::{TaskSpec, TaskStatus};
    use crate::workitem::WorkItem;

    struct MisbehavingExecutor {
        descriptor: ExecutorDescriptor,
        wrong_id: bool,
    }

    #[async_trait]
    impl Executor for MisbehavingExecutor {
        fn descriptor(&self) -> &ExecutorDescriptor {
            &self.descriptor
        }

        async fn plan_tasks(&self, _item: &WorkItem) -> Result<Vec<TaskSpec>> {
            Ok(vec![])
        }

        async fn execute(&self, task: &Task, _cancel: &CancellationToken) -> Result<TaskResult> {
            if self.wrong_id {
                Ok(TaskResult::completed("someone-else", "oops"))
            } else {
                Err(ForemanError::Boundary("backend unavailable".into()))
            }
        }
    }

    fn adapter(wrong_id: bool) -> ExecutionAdapter {
        let registry = ExecutorRegistry::builder()
            .register(Arc::new(MisbehavingExecutor {
                descriptor: ExecutorDescriptor::new("e1", "backend"),
                wrong_id,
            }))
            .build()
            .unwrap();
        ExecutionAdapter::new(Arc::new(registry))
    }

    fn task() -> Task {
        Task {
            id: "t1".into(),
            owner_executor_id: "e1".into(),
            description: "demo".into(),
            depends_on: vec![],
            status: TaskStatus::Running,
        }
    }

    #[tokio::test]
    async fn test_boundary_errors_are_normalized() {
        let err = adapter(false)
            .invoke(&task(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ForemanError::Execution { task_id, cause } => {
                assert_eq!(task_id, "t1");
                assert!(cause.contains("backend unavailable"));
            }
            other => panic!("expected Execution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_task_id_is_rejected() {
        let err = adapter(true)
            .invoke(&task(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForemanError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_unknown_owner_is_rejected() {
        let adapter = adapter(false);
        let mut t = task();
        t.owner_executor_id = "ghost".into();
        let err = adapter.invoke(&t, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ForemanError::ExecutorNotFound(_)));
    }
}
