//! Dry run: build the graph and resolve what can be resolved statically,
//! without performing any network I/O.

use gantrycore::template::{self, TemplateExpression};
use gantrycore::{EngineError, TaskCatalog, TemplateContext, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::graph::ExecutionGraph;

/// The planned execution of a workflow: parallel groups, statically
/// resolved values, and everything that would fail before any task ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub workflow: String,
    /// Parallel groups in execution order.
    pub levels: Vec<Vec<String>>,
    /// "step.field" -> value, for templates referencing only the input.
    pub resolved: HashMap<String, Value>,
    /// "step.field" entries whose templates reference task outputs and so
    /// can only resolve at execution time.
    pub deferred: Vec<String>,
    pub issues: Vec<PlanIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanIssue {
    pub step_id: Option<String>,
    pub field: String,
    pub message: String,
}

/// Build an execution plan. Cycles surface here as errors with the exact
/// cycle path; template and input problems become plan issues.
pub fn plan(
    workflow: &WorkflowDefinition,
    catalog: &dyn TaskCatalog,
    input: Value,
) -> Result<ExecutionPlan, EngineError> {
    let graph = ExecutionGraph::build(workflow)?;
    let context = TemplateContext::new(input);

    let mut resolved = HashMap::new();
    let mut deferred = Vec::new();
    let mut issues = Vec::new();

    for step in &workflow.steps {
        if catalog.get_task_definition(&step.task_ref).is_none() {
            issues.push(PlanIssue {
                step_id: Some(step.id.clone()),
                field: "task_ref".to_string(),
                message: format!("task definition '{}' not found", step.task_ref),
            });
        }

        let mut fields: Vec<(&String, &String)> = step.input.iter().collect();
        fields.sort_by_key(|(field, _)| field.as_str());
        for (field, text) in fields {
            let key = format!("{}.{}", step.id, field);
            match classify(text) {
                Classification::Static => match template::resolve(text, &context) {
                    Ok(value) => {
                        resolved.insert(key, value);
                    }
                    Err(e) => issues.push(PlanIssue {
                        step_id: Some(step.id.clone()),
                        field: field.clone(),
                        message: e.to_string(),
                    }),
                },
                Classification::Deferred => deferred.push(key),
                Classification::Invalid(message) => issues.push(PlanIssue {
                    step_id: Some(step.id.clone()),
                    field: field.clone(),
                    message,
                }),
            }
        }
    }

    let mut output_fields: Vec<(&String, &String)> = workflow.output.iter().collect();
    output_fields.sort_by_key(|(field, _)| field.as_str());
    for (field, text) in output_fields {
        match classify(text) {
            Classification::Static => match template::resolve(text, &context) {
                Ok(value) => {
                    resolved.insert(format!("output.{}", field), value);
                }
                Err(e) => issues.push(PlanIssue {
                    step_id: None,
                    field: field.clone(),
                    message: e.to_string(),
                }),
            },
            Classification::Deferred => deferred.push(format!("output.{}", field)),
            Classification::Invalid(message) => issues.push(PlanIssue {
                step_id: None,
                field: field.clone(),
                message,
            }),
        }
    }

    deferred.sort();
    Ok(ExecutionPlan {
        workflow: workflow.name.clone(),
        levels: graph.levels().to_vec(),
        resolved,
        deferred,
        issues,
    })
}

enum Classification {
    /// References the input only; resolvable now.
    Static,
    /// References task outputs; resolvable only at execution time.
    Deferred,
    Invalid(String),
}

fn classify(template: &str) -> Classification {
    match template::extract_references(template) {
        Ok(references) => {
            let has_task_refs = references
                .iter()
                .any(|r| matches!(r, TemplateExpression::TaskOutput { .. }));
            if has_task_refs {
                Classification::Deferred
            } else {
                Classification::Static
            }
        }
        Err(e) => Classification::Invalid(e.to_string()),
    }
}
