use gantrycore::{
    EngineError, EventBus, ExecutionEvent, InMemoryCatalog, TaskCatalog, TaskDefinition,
    TaskRunner, WorkflowCatalog, WorkflowDefinition, WorkflowExecutionResult,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::graph::ExecutionGraph;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::plan::{self, ExecutionPlan};

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_parallel: usize,
    pub global_timeout: Duration,
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            global_timeout: Duration::from_secs(30),
            event_buffer_size: 1000,
        }
    }
}

/// Top-level entry point: owns the orchestrator, the task runner, the event
/// bus, and an in-memory catalog pair for the server and CLI surfaces.
///
/// Each execution works against a catalog snapshot taken when it starts, so
/// registrations mid-flight never change a running workflow.
pub struct Engine {
    orchestrator: Orchestrator,
    runner: Arc<dyn TaskRunner>,
    event_bus: Arc<EventBus>,
    catalog: Arc<RwLock<InMemoryCatalog>>,
}

impl Engine {
    pub fn new(runner: Arc<dyn TaskRunner>, config: EngineConfig) -> Self {
        Self {
            orchestrator: Orchestrator::new(OrchestratorConfig {
                max_parallel: config.max_parallel,
                global_timeout: config.global_timeout,
            }),
            runner,
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            catalog: Arc::new(RwLock::new(InMemoryCatalog::new())),
        }
    }

    pub async fn register_task(&self, task: TaskDefinition) {
        self.catalog.write().await.insert_task(task);
    }

    pub async fn register_workflow(&self, workflow: WorkflowDefinition) {
        self.catalog.write().await.insert_workflow(workflow);
    }

    pub async fn task_names(&self) -> Vec<String> {
        self.catalog.read().await.task_names()
    }

    pub async fn workflow_names(&self) -> Vec<String> {
        self.catalog.read().await.workflow_names()
    }

    pub async fn get_workflow(&self, name: &str) -> Option<WorkflowDefinition> {
        self.catalog.read().await.get_workflow_definition(name)
    }

    pub async fn get_task(&self, name: &str) -> Option<TaskDefinition> {
        self.catalog.read().await.get_task_definition(name)
    }

    /// Execute a registered workflow by name.
    pub async fn execute_workflow(
        &self,
        name: &str,
        input: Value,
    ) -> Result<WorkflowExecutionResult, EngineError> {
        self.execute_with_cancellation(name, input, CancellationToken::new())
            .await
    }

    /// Execute a registered workflow, honoring an upstream cancellation
    /// signal (e.g. the caller disconnecting).
    pub async fn execute_with_cancellation(
        &self,
        name: &str,
        input: Value,
        cancel: CancellationToken,
    ) -> Result<WorkflowExecutionResult, EngineError> {
        let catalog = self.catalog.read().await.clone();
        let workflow = catalog
            .get_workflow_definition(name)
            .ok_or_else(|| EngineError::WorkflowNotFound(name.to_string()))?;
        let graph = ExecutionGraph::build(&workflow)?;

        Ok(self
            .orchestrator
            .execute(
                &workflow,
                &graph,
                &catalog,
                input,
                self.runner.clone(),
                &self.event_bus,
                cancel,
            )
            .await)
    }

    /// Plan a registered workflow without executing anything.
    pub async fn dry_run(&self, name: &str, input: Value) -> Result<ExecutionPlan, EngineError> {
        let catalog = self.catalog.read().await.clone();
        let workflow = catalog
            .get_workflow_definition(name)
            .ok_or_else(|| EngineError::WorkflowNotFound(name.to_string()))?;
        plan::plan(&workflow, &catalog, input)
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}
