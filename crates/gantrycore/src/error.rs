use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Task definition not found: {0}")]
    TaskNotFound(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Invalid template syntax: '{expr}'")]
    InvalidSyntax { expr: String },

    #[error("Missing input value: {path}")]
    MissingInput { path: String },

    #[error("Missing task output: {step_id}")]
    MissingTaskOutput { step_id: String },
}

#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },

    #[error("Schema validation failed: {}", format_field_errors(.errors))]
    SchemaValidation { errors: Vec<FieldError> },

    #[error("Network failure: {message}")]
    Network { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Circular dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Field-level error reported by a schema validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}
