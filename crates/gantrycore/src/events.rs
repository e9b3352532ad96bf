use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    LevelStarted {
        execution_id: ExecutionId,
        level: usize,
        steps: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        execution_id: ExecutionId,
        step_id: String,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        execution_id: ExecutionId,
        step_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        execution_id: ExecutionId,
        step_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    TaskSkipped {
        execution_id: ExecutionId,
        step_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// In-process event bus; subscribers see execution progress live.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}
