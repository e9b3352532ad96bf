use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Terminal status of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    /// Never executed: a dependency failed or was skipped, a condition
    /// evaluated falsy, or the global deadline expired first.
    Skipped,
}

/// Per-step outcome. Immutable once the step finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    pub step_id: String,
    pub status: TaskStatus,
    pub output: Option<Value>,
    pub errors: Vec<String>,
    /// Retries actually consumed (not counting the initial attempt).
    pub retry_count: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TaskExecutionResult {
    pub fn succeeded(
        step_id: impl Into<String>,
        output: Value,
        retry_count: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            step_id: step_id.into(),
            status: TaskStatus::Succeeded,
            output: Some(output),
            errors: Vec::new(),
            retry_count,
            started_at,
            finished_at,
            duration_ms: duration_ms_between(started_at, finished_at),
        }
    }

    pub fn failed(
        step_id: impl Into<String>,
        errors: Vec<String>,
        retry_count: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            step_id: step_id.into(),
            status: TaskStatus::Failed,
            output: None,
            errors,
            retry_count,
            started_at,
            finished_at,
            duration_ms: duration_ms_between(started_at, finished_at),
        }
    }

    pub fn skipped(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            step_id: step_id.into(),
            status: TaskStatus::Skipped,
            output: None,
            errors: vec![reason.into()],
            retry_count: 0,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    pub fn success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Overall outcome of one workflow execution, produced exactly once by the
/// orchestrator after all reachable steps have finished or been skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionResult {
    pub success: bool,
    /// Aggregated output per the workflow's output mapping; fields that
    /// failed to resolve are absent here and reported in `errors`.
    pub output: serde_json::Map<String, Value>,
    pub tasks: HashMap<String, TaskExecutionResult>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

fn duration_ms_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}
