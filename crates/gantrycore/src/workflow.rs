use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named composition of task steps with an output mapping.
/// Immutable once loaded; the validation layer guarantees every `task_ref`
/// resolves and template syntax is well formed before execution sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<TaskStep>,
    #[serde(default)]
    pub input_schema: Option<Value>,
    /// Output-field name -> template referencing task outputs.
    #[serde(default)]
    pub output: HashMap<String, String>,
}

/// One task invocation within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: String,
    /// Name of the TaskDefinition this step invokes.
    pub task_ref: String,
    /// Input-field name -> template. Task-output references here are what
    /// the graph builder turns into dependency edges.
    #[serde(default)]
    pub input: HashMap<String, String>,
    /// Optional condition template; a falsy value skips the step.
    #[serde(default)]
    pub condition: Option<String>,
    /// Optional per-step timeout override, same format as task timeouts.
    #[serde(default)]
    pub timeout: Option<String>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            input_schema: None,
            output: HashMap::new(),
        }
    }

    pub fn add_step(&mut self, step: TaskStep) {
        self.steps.push(step);
    }

    pub fn with_step(mut self, step: TaskStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_output(mut self, field: impl Into<String>, template: impl Into<String>) -> Self {
        self.output.insert(field.into(), template.into());
        self
    }

    pub fn find_step(&self, id: &str) -> Option<&TaskStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

impl TaskStep {
    pub fn new(id: impl Into<String>, task_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_ref: task_ref.into(),
            input: HashMap::new(),
            condition: None,
            timeout: None,
        }
    }

    pub fn with_input(mut self, field: impl Into<String>, template: impl Into<String>) -> Self {
        self.input.insert(field.into(), template.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }
}
