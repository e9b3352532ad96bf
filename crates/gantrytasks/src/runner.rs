//! The HTTP task runner: binds template resolution, schema validation, and
//! retry into one task execution.

use async_trait::async_trait;
use chrono::Utc;
use gantrycore::template;
use gantrycore::{
    parse_duration, RetryPolicy, TaskError, TaskExecutionResult, TaskInvocation, TaskKind,
    TaskRunner, TemplateContext,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::validator::SchemaValidator;

pub struct HttpTaskRunner {
    transport: Arc<dyn HttpTransport>,
    validator: Arc<dyn SchemaValidator>,
    retry: RetryPolicy,
}

impl HttpTaskRunner {
    pub fn new(transport: Arc<dyn HttpTransport>, validator: Arc<dyn SchemaValidator>) -> Self {
        Self {
            transport,
            validator,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One send plus response handling. 2xx parses and validates; 5xx and
    /// transport failures come back as retryable network errors; other
    /// statuses fail outright.
    async fn send_once(
        &self,
        request: &HttpRequest,
        output_schema: Option<&Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, TaskError> {
        let response = tokio::select! {
            result = self.transport.send(request.clone()) => result?,
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
        };

        match response.status {
            200..=299 => {
                let output = parse_body(&response.body);
                if let Some(schema) = output_schema {
                    // the server responded; a bad shape will not improve
                    // with retries
                    if let Err(errors) = self.validator.validate(schema, &output) {
                        return Err(TaskError::SchemaValidation { errors });
                    }
                }
                Ok(output)
            }
            status @ 500..=599 => Err(TaskError::Network {
                message: format!("server returned HTTP {}", status),
            }),
            status => Err(TaskError::Http {
                status,
                message: String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(200)
                    .collect(),
            }),
        }
    }

    async fn attempt_loop(
        &self,
        invocation: &TaskInvocation,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
        retries: &AtomicU32,
    ) -> Result<Value, TaskError> {
        let TaskKind::Http(spec) = &invocation.definition.kind;
        let request = prepare_request(spec, invocation, timeout, self.validator.as_ref())?;
        let output_schema = spec.output_schema.as_ref();

        let mut attempt: u32 = 0;
        loop {
            let error = match self.send_once(&request, output_schema, cancel).await {
                Ok(output) => return Ok(output),
                Err(error) => error,
            };

            if !self.retry.should_retry(&error, attempt + 1) {
                return Err(error);
            }
            attempt += 1;
            retries.store(attempt, Ordering::SeqCst);
            let delay = self.retry.delay_for(attempt as i64);
            tracing::debug!(
                step = %invocation.step_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying task"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            }
        }
    }

    fn task_timeout(&self, invocation: &TaskInvocation) -> Result<Option<Duration>, TaskError> {
        // a step-level timeout overrides the task definition's
        if let Some(text) = &invocation.timeout {
            return parse_duration(text).map(Some);
        }
        invocation.definition.timeout_duration()
    }
}

#[async_trait]
impl TaskRunner for HttpTaskRunner {
    async fn run(
        &self,
        invocation: TaskInvocation,
        cancel: CancellationToken,
    ) -> TaskExecutionResult {
        let started_at = Utc::now();
        let retries = AtomicU32::new(0);

        let timeout = match self.task_timeout(&invocation) {
            Ok(timeout) => timeout,
            Err(error) => {
                return TaskExecutionResult::failed(
                    invocation.step_id.as_str(),
                    vec![error.to_string()],
                    0,
                    started_at,
                );
            }
        };

        let outcome = match timeout {
            Some(limit) => {
                let attempts = self.attempt_loop(&invocation, timeout, &cancel, &retries);
                match tokio::time::timeout(limit, attempts).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TaskError::Timeout {
                        elapsed_ms: limit.as_millis() as u64,
                    }),
                }
            }
            None => self.attempt_loop(&invocation, None, &cancel, &retries).await,
        };

        let retry_count = retries.load(Ordering::SeqCst);
        match outcome {
            Ok(output) => {
                TaskExecutionResult::succeeded(invocation.step_id.as_str(), output, retry_count, started_at)
            }
            Err(error) => TaskExecutionResult::failed(
                invocation.step_id.as_str(),
                vec![error.to_string()],
                retry_count,
                started_at,
            ),
        }
    }
}

/// Resolve the step's input mapping, then the task's own templates against
/// that resolved input. The two stages keep task definitions reusable:
/// `{{input.*}}` in a task URL refers to the step's input fields, whatever
/// the enclosing workflow wired into them.
fn prepare_request(
    spec: &gantrycore::HttpTaskSpec,
    invocation: &TaskInvocation,
    timeout: Option<Duration>,
    validator: &dyn SchemaValidator,
) -> Result<HttpRequest, TaskError> {
    let mut resolved_inputs = serde_json::Map::new();
    let mut fields: Vec<(&String, &String)> = invocation.inputs.iter().collect();
    fields.sort_by_key(|(field, _)| field.as_str());
    for (field, text) in fields {
        resolved_inputs.insert(field.clone(), template::resolve(text, &invocation.context)?);
    }
    let resolved_inputs = Value::Object(resolved_inputs);

    if let Some(schema) = &spec.input_schema {
        if let Err(errors) = validator.validate(schema, &resolved_inputs) {
            return Err(TaskError::SchemaValidation { errors });
        }
    }

    let task_context = invocation.context.with_input(resolved_inputs.clone());

    let method = HttpMethod::parse(&template::resolve_to_string(&spec.method, &task_context)?)?;
    let url = template::resolve_to_string(&spec.url, &task_context)?;

    let mut headers = Vec::new();
    let mut declared: Vec<(&String, &String)> = spec.headers.iter().collect();
    declared.sort_by_key(|(name, _)| name.as_str());
    for (name, text) in declared {
        headers.push((name.clone(), template::resolve_to_string(text, &task_context)?));
    }

    let body = match &spec.body {
        Some(text) => Some(encode_body(template::resolve(text, &task_context)?)?),
        None if method.has_body() => match &resolved_inputs {
            Value::Object(map) if map.is_empty() => None,
            inputs => Some(encode_body(inputs.clone())?),
        },
        None => None,
    };

    if body.is_some() && !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-type")) {
        headers.push(("content-type".to_string(), "application/json".to_string()));
    }

    Ok(HttpRequest {
        method,
        url,
        headers,
        body,
        timeout,
    })
}

fn encode_body(value: Value) -> Result<Vec<u8>, TaskError> {
    match value {
        Value::String(text) => Ok(text.into_bytes()),
        composite => serde_json::to_vec(&composite)
            .map_err(|e| TaskError::Configuration(format!("unserializable body: {}", e))),
    }
}

fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
