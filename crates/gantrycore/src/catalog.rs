use crate::task::TaskDefinition;
use crate::workflow::WorkflowDefinition;
use std::collections::HashMap;

/// Source of task definitions. The snapshot handed to an execution is
/// consistent for its whole duration; the catalog is always an explicit
/// argument, never ambient state.
pub trait TaskCatalog: Send + Sync {
    fn get_task_definition(&self, name: &str) -> Option<TaskDefinition>;
}

/// Source of workflow definitions.
pub trait WorkflowCatalog: Send + Sync {
    fn get_workflow_definition(&self, name: &str) -> Option<WorkflowDefinition>;
}

/// In-memory catalog backing the server and CLI. In a cluster deployment
/// the same traits front the resource store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tasks: HashMap<String, TaskDefinition>,
    workflows: HashMap<String, WorkflowDefinition>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_task(&mut self, task: TaskDefinition) {
        self.tasks.insert(task.name.clone(), task);
    }

    pub fn insert_workflow(&mut self, workflow: WorkflowDefinition) {
        self.workflows.insert(workflow.name.clone(), workflow);
    }

    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn workflow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.keys().cloned().collect();
        names.sort();
        names
    }
}

impl TaskCatalog for InMemoryCatalog {
    fn get_task_definition(&self, name: &str) -> Option<TaskDefinition> {
        self.tasks.get(name).cloned()
    }
}

impl WorkflowCatalog for InMemoryCatalog {
    fn get_workflow_definition(&self, name: &str) -> Option<WorkflowDefinition> {
        self.workflows.get(name).cloned()
    }
}
