//! Level-ordered workflow driver.
//!
//! Executes the graph's parallel groups in order, fans tasks within a level
//! out under a concurrency limit, joins the level before the next starts
//! (so later templates see every earlier output), propagates failures to
//! dependents as skips, and aggregates the output mapping at the end.

use chrono::Utc;
use gantrycore::template;
use gantrycore::{
    EventBus, ExecutionEvent, TaskCatalog, TaskExecutionResult, TaskInvocation, TaskRunner,
    TaskStatus, TaskStep, TemplateContext, WorkflowDefinition, WorkflowExecutionResult,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::graph::ExecutionGraph;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum in-flight tasks per execution.
    pub max_parallel: usize,
    /// Global deadline for one execution.
    pub global_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            global_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Execute a workflow over its prebuilt graph.
    ///
    /// Always returns a populated result; task failures, timeouts, and
    /// cancellation are encoded in it rather than propagated.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        graph: &ExecutionGraph,
        catalog: &dyn TaskCatalog,
        input: Value,
        runner: Arc<dyn TaskRunner>,
        event_bus: &EventBus,
        cancel: CancellationToken,
    ) -> WorkflowExecutionResult {
        let execution_id = Uuid::new_v4();
        let start = Instant::now();
        let deadline = start + self.config.global_timeout;

        event_bus.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow: workflow.name.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(workflow = %workflow.name, %execution_id, "starting workflow execution");

        let steps_by_id: HashMap<&str, &TaskStep> =
            workflow.steps.iter().map(|s| (s.id.as_str(), s)).collect();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let task_cancel = cancel.child_token();

        let mut context = TemplateContext::new(input);
        let mut results: HashMap<String, TaskExecutionResult> = HashMap::new();
        let mut errors: Vec<String> = Vec::new();
        let mut aborted_reason: Option<String> = None;

        for (level_index, level) in graph.levels().iter().enumerate() {
            if cancel.is_cancelled() {
                aborted_reason = Some("execution cancelled".to_string());
                break;
            }
            if Instant::now() >= deadline {
                aborted_reason = Some(format!(
                    "global deadline of {:?} exceeded",
                    self.config.global_timeout
                ));
                break;
            }

            event_bus.emit(ExecutionEvent::LevelStarted {
                execution_id,
                level: level_index,
                steps: level.clone(),
                timestamp: Utc::now(),
            });

            let mut handles = Vec::new();
            for step_id in level {
                let step = match steps_by_id.get(step_id.as_str()) {
                    Some(step) => *step,
                    None => {
                        errors.push(format!("step '{}' missing from workflow", step_id));
                        continue;
                    }
                };

                // Failure propagation: any non-succeeded dependency skips
                // this step without invoking the runner.
                let mut failed_deps: Vec<&str> = graph
                    .dependencies_of(step_id)
                    .filter(|dep| !results.get(*dep).map(|r| r.success()).unwrap_or(false))
                    .collect();
                failed_deps.sort_unstable();
                if let Some(dep) = failed_deps.first() {
                    let reason = format!("skipped because dependency '{}' failed", dep);
                    emit_skip(event_bus, execution_id, step_id, &reason);
                    results.insert(step_id.clone(), TaskExecutionResult::skipped(step_id.as_str(), reason));
                    continue;
                }

                if let Some(condition) = &step.condition {
                    match template::resolve(condition, &context) {
                        Ok(value) if !truthy(&value) => {
                            let reason = "condition evaluated to false".to_string();
                            emit_skip(event_bus, execution_id, step_id, &reason);
                            results.insert(
                                step_id.clone(),
                                TaskExecutionResult::skipped(step_id.as_str(), reason),
                            );
                            continue;
                        }
                        Err(e) => {
                            let message = format!("condition failed to resolve: {}", e);
                            errors.push(format!("step '{}' failed: {}", step_id, message));
                            results.insert(
                                step_id.clone(),
                                TaskExecutionResult::failed(
                                    step_id.as_str(),
                                    vec![message],
                                    0,
                                    Utc::now(),
                                ),
                            );
                            continue;
                        }
                        Ok(_) => {}
                    }
                }

                let definition = match catalog.get_task_definition(&step.task_ref) {
                    Some(definition) => definition,
                    None => {
                        let message = format!("task definition '{}' not found", step.task_ref);
                        errors.push(format!("step '{}' failed: {}", step_id, message));
                        results.insert(
                            step_id.clone(),
                            TaskExecutionResult::failed(step_id.as_str(), vec![message], 0, Utc::now()),
                        );
                        continue;
                    }
                };

                event_bus.emit(ExecutionEvent::TaskStarted {
                    execution_id,
                    step_id: step_id.clone(),
                    timestamp: Utc::now(),
                });

                let invocation = TaskInvocation {
                    step_id: step_id.clone(),
                    definition,
                    inputs: step.input.clone(),
                    context: context.clone(),
                    timeout: step.timeout.clone(),
                };
                let runner = runner.clone();
                let cancel = task_cancel.clone();
                let permit = semaphore.clone().acquire_owned();

                handles.push(tokio::spawn(async move {
                    let _permit = permit.await;
                    runner.run(invocation, cancel).await
                }));
            }

            // Join barrier: level N outputs must be fully visible before
            // level N+1 resolves its templates. On deadline expiry the
            // in-flight tasks are cancelled and still joined, so their
            // results land in the final report.
            let mut join = futures::future::join_all(handles);
            let level_results = tokio::select! {
                results = &mut join => results,
                _ = tokio::time::sleep_until(deadline) => {
                    task_cancel.cancel();
                    join.await
                }
            };
            for joined in level_results {
                match joined {
                    Ok(result) => {
                        match result.status {
                            TaskStatus::Succeeded => {
                                tracing::info!(step = %result.step_id, duration_ms = result.duration_ms, "task completed");
                                event_bus.emit(ExecutionEvent::TaskCompleted {
                                    execution_id,
                                    step_id: result.step_id.clone(),
                                    duration_ms: result.duration_ms,
                                    timestamp: Utc::now(),
                                });
                                if let Some(output) = &result.output {
                                    context.insert_output(result.step_id.clone(), output.clone());
                                }
                            }
                            _ => {
                                let error = result.errors.join("; ");
                                tracing::warn!(step = %result.step_id, %error, "task failed");
                                event_bus.emit(ExecutionEvent::TaskFailed {
                                    execution_id,
                                    step_id: result.step_id.clone(),
                                    error: error.clone(),
                                    timestamp: Utc::now(),
                                });
                                errors.push(format!("step '{}' failed: {}", result.step_id, error));
                            }
                        }
                        results.insert(result.step_id.clone(), result);
                    }
                    Err(e) => errors.push(format!("task join error: {}", e)),
                }
            }
        }

        if let Some(reason) = &aborted_reason {
            task_cancel.cancel();
            errors.push(reason.clone());
            for step in &workflow.steps {
                if !results.contains_key(&step.id) {
                    results.insert(
                        step.id.clone(),
                        TaskExecutionResult::skipped(step.id.as_str(), reason.clone()),
                    );
                }
            }
        }

        // Execution outcome is fixed before aggregation: output-mapping
        // failures are reported per field without flipping it.
        let success = aborted_reason.is_none()
            && errors.is_empty()
            && results.values().all(|r| r.status != TaskStatus::Failed);

        let mut output = serde_json::Map::new();
        let mut fields: Vec<(&String, &String)> = workflow.output.iter().collect();
        fields.sort_by_key(|(field, _)| field.as_str());
        for (field, mapping) in fields {
            match template::resolve(mapping, &context) {
                Ok(value) => {
                    output.insert(field.clone(), value);
                }
                Err(e) => errors.push(format!("output field '{}': {}", field, e)),
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        event_bus.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(workflow = %workflow.name, success, duration_ms, "workflow execution finished");

        WorkflowExecutionResult {
            success,
            output,
            tasks: results,
            errors,
            duration_ms,
        }
    }
}

fn emit_skip(event_bus: &EventBus, execution_id: Uuid, step_id: &str, reason: &str) {
    tracing::debug!(step = %step_id, %reason, "skipping task");
    event_bus.emit(ExecutionEvent::TaskSkipped {
        execution_id,
        step_id: step_id.to_string(),
        reason: reason.to_string(),
        timestamp: Utc::now(),
    });
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}
