use crate::context::TemplateContext;
use crate::result::TaskExecutionResult;
use crate::task::TaskDefinition;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Everything one task execution needs: the definition, the step's raw
/// input templates, and a context snapshot taken at the previous level's
/// join barrier.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub step_id: String,
    pub definition: TaskDefinition,
    /// Input-field name -> unresolved template.
    pub inputs: HashMap<String, String>,
    pub context: TemplateContext,
    /// Step-level timeout override, already in duration-string form.
    pub timeout: Option<String>,
}

/// Executes one task. Implementations never propagate errors: every
/// failure mode (template, network, validation, timeout, cancellation)
/// is encoded in the returned result, so callers only inspect status.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(
        &self,
        invocation: TaskInvocation,
        cancel: CancellationToken,
    ) -> TaskExecutionResult;
}
