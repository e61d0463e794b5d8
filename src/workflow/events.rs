//! Lifecycle events emitted while a workflow advances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowStarted,
    StageStarted,
    TaskCompleted,
    TaskFailed,
    VerificationResult,
    WorkflowCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => "workflow.started",
            Self::StageStarted => "stage.started",
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::VerificationResult => "verification.result",
            Self::WorkflowCompleted => "workflow.completed",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::TaskFailed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_type: EventType,
    pub workflow_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkflowEvent {
    pub fn new(event_type: EventType, workflow_id: impl Into<String>) -> Self {
        Self {
            event_type,
            workflow_id: workflow_id.into(),
            created_at: Utc::now(),
            task_id: None,
            stage: None,
            message: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_stage(mut self, stage: usize) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Broadcast fan-out for lifecycle events. Emission never blocks and never
/// fails when nobody is listening.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: WorkflowEvent) {
        trace!(event = event.event_type.as_str(), workflow = %event.workflow_id, "Event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(WorkflowEvent::new(EventType::WorkflowStarted, "wf-1"));
        bus.emit(
            WorkflowEvent::new(EventType::TaskCompleted, "wf-1").with_task("t1"),
        );

        assert_eq!(rx.recv().await.unwrap().event_type, EventType::WorkflowStarted);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_type, EventType::TaskCompleted);
        assert_eq!(second.task_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.emit(WorkflowEvent::new(EventType::WorkflowStarted, "wf-1"));
    }
}
