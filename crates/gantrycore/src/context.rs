use serde_json::Value;
use std::collections::HashMap;

/// Runtime state threaded through one workflow execution.
///
/// Holds the workflow's resolved input plus the outputs of every completed
/// step. Each execution owns its own context; the orchestrator merges step
/// outputs between levels, so parallel tasks only ever see a snapshot taken
/// at the previous join barrier.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    input: Value,
    task_outputs: HashMap<String, Value>,
}

impl TemplateContext {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            task_outputs: HashMap::new(),
        }
    }

    /// Build a context with a different input but the same task outputs.
    ///
    /// Used by the task executor: task-definition templates resolve against
    /// the step's resolved input rather than the workflow input.
    pub fn with_input(&self, input: Value) -> Self {
        Self {
            input,
            task_outputs: self.task_outputs.clone(),
        }
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Record a completed step's output.
    pub fn insert_output(&mut self, step_id: impl Into<String>, output: Value) {
        self.task_outputs.insert(step_id.into(), output);
    }

    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.task_outputs.get(step_id)
    }

    pub fn completed_steps(&self) -> impl Iterator<Item = &str> {
        self.task_outputs.keys().map(|s| s.as_str())
    }
}
