use async_trait::async_trait;
use gantrycore::{
    HttpTaskSpec, RetryPolicy, TaskDefinition, TaskInvocation, TaskRunner, TaskStatus,
    TemplateContext,
};
use gantrytasks::{
    BasicValidator, HttpRequest, HttpResponse, HttpTaskRunner, HttpTransport,
};
use gantrycore::TaskError;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Transport replaying a scripted sequence of responses, recording every
/// request and its timestamp.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TaskError>>>,
    requests: Mutex<Vec<(HttpRequest, Instant)>>,
    delay: Duration,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<HttpResponse, TaskError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    fn slow(script: Vec<Result<HttpResponse, TaskError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn requests(&self) -> Vec<(HttpRequest, Instant)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TaskError> {
        self.requests
            .lock()
            .unwrap()
            .push((request, Instant::now()));
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TaskError::Network {
                    message: "script exhausted".to_string(),
                })
            })
    }
}

fn ok(status: u16, body: Value) -> Result<HttpResponse, TaskError> {
    Ok(HttpResponse {
        status,
        body: serde_json::to_vec(&body).unwrap(),
    })
}

fn network_error() -> Result<HttpResponse, TaskError> {
    Err(TaskError::Network {
        message: "connection reset".to_string(),
    })
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_delay_ms: 20,
        max_delay_ms: 1_000,
        backoff_multiplier: 2.0,
        max_retry_count: 3,
    }
}

fn invocation(
    spec: HttpTaskSpec,
    inputs: &[(&str, &str)],
    workflow_input: Value,
) -> TaskInvocation {
    let mut input_map = HashMap::new();
    for (field, template) in inputs {
        input_map.insert(field.to_string(), template.to_string());
    }
    TaskInvocation {
        step_id: "step-1".to_string(),
        definition: TaskDefinition::http("test-task", spec),
        inputs: input_map,
        context: TemplateContext::new(workflow_input),
        timeout: None,
    }
}

fn runner(transport: Arc<ScriptedTransport>) -> HttpTaskRunner {
    HttpTaskRunner::new(transport, Arc::new(BasicValidator)).with_retry_policy(fast_retry())
}

#[tokio::test]
async fn resolves_templates_and_parses_json_response() {
    let transport = ScriptedTransport::new(vec![ok(200, json!({ "email": "ada@example.com" }))]);
    let runner = runner(transport.clone());

    let invocation = invocation(
        HttpTaskSpec::new("GET", "http://api.test/users/{{input.userId}}")
            .with_header("x-request-source", "{{input.source}}"),
        &[
            ("userId", "{{input.id}}"),
            ("source", "gateway"),
        ],
        json!({ "id": "7" }),
    );
    let result = runner.run(invocation, CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Succeeded, "errors: {:?}", result.errors);
    assert_eq!(result.output, Some(json!({ "email": "ada@example.com" })));
    assert_eq!(result.retry_count, 0);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0.url, "http://api.test/users/7");
    assert!(requests[0]
        .0
        .headers
        .contains(&("x-request-source".to_string(), "gateway".to_string())));
}

#[tokio::test]
async fn retries_follow_the_backoff_schedule() {
    // four total attempts: the initial one plus max_retry_count retries
    let transport = ScriptedTransport::new(vec![
        network_error(),
        network_error(),
        network_error(),
        network_error(),
    ]);
    let runner = runner(transport.clone());

    let started = Instant::now();
    let result = runner
        .run(
            invocation(HttpTaskSpec::new("GET", "http://api.test/x"), &[], json!({})),
            CancellationToken::new(),
        )
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.retry_count, 3);
    assert!(result.errors[0].contains("Network failure"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    // delays double deterministically: 20ms, 40ms, 80ms
    assert!(elapsed >= Duration::from_millis(140), "elapsed {:?}", elapsed);
    let gap1 = requests[1].1 - requests[0].1;
    let gap2 = requests[2].1 - requests[1].1;
    let gap3 = requests[3].1 - requests[2].1;
    assert!(gap1 >= Duration::from_millis(20), "gap1 {:?}", gap1);
    assert!(gap2 >= Duration::from_millis(40), "gap2 {:?}", gap2);
    assert!(gap3 >= Duration::from_millis(80), "gap3 {:?}", gap3);
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let transport =
        ScriptedTransport::new(vec![network_error(), ok(200, json!({ "value": 1 }))]);
    let runner = runner(transport.clone());

    let result = runner
        .run(
            invocation(HttpTaskSpec::new("GET", "http://api.test/x"), &[], json!({})),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TaskStatus::Succeeded);
    assert_eq!(result.retry_count, 1);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let transport = ScriptedTransport::new(vec![
        ok(503, json!({ "error": "unavailable" })),
        ok(200, json!({ "value": 1 })),
    ]);
    let runner = runner(transport.clone());

    let result = runner
        .run(
            invocation(HttpTaskSpec::new("GET", "http://api.test/x"), &[], json!({})),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TaskStatus::Succeeded);
    assert_eq!(result.retry_count, 1);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let transport = ScriptedTransport::new(vec![ok(404, json!({ "error": "missing" }))]);
    let runner = runner(transport.clone());

    let result = runner
        .run(
            invocation(HttpTaskSpec::new("GET", "http://api.test/x"), &[], json!({})),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.retry_count, 0);
    assert!(result.errors[0].contains("HTTP 404"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn schema_mismatch_fails_without_retry() {
    let transport = ScriptedTransport::new(vec![ok(200, json!({ "unexpected": true }))]);
    let runner = runner(transport.clone());

    let spec = HttpTaskSpec::new("GET", "http://api.test/x").with_output_schema(json!({
        "type": "object",
        "required": ["email"],
    }));
    let result = runner
        .run(invocation(spec, &[], json!({})), CancellationToken::new())
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.retry_count, 0);
    assert!(result.errors[0].contains("Schema validation failed"));
    assert!(result.errors[0].contains("email"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn invalid_resolved_input_fails_before_any_request() {
    let transport = ScriptedTransport::new(vec![ok(200, json!({}))]);
    let runner = runner(transport.clone());

    let spec = HttpTaskSpec::new("GET", "http://api.test/x").with_input_schema(json!({
        "type": "object",
        "properties": { "count": { "type": "integer" } },
    }));
    let result = runner
        .run(
            invocation(spec, &[("count", "not-a-number")], json!({})),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.errors[0].contains("Schema validation failed"));
    assert_eq!(transport.requests().len(), 0);
}

#[tokio::test]
async fn unsupported_method_fails_immediately() {
    let transport = ScriptedTransport::new(vec![]);
    let runner = runner(transport.clone());

    let result = runner
        .run(
            invocation(HttpTaskSpec::new("BREW", "http://api.test/x"), &[], json!({})),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.errors[0].contains("Unsupported HTTP method"));
    assert_eq!(transport.requests().len(), 0);
}

#[tokio::test]
async fn missing_template_input_fails_before_any_request() {
    let transport = ScriptedTransport::new(vec![]);
    let runner = runner(transport.clone());

    let result = runner
        .run(
            invocation(
                HttpTaskSpec::new("GET", "http://api.test/{{input.missing}}"),
                &[],
                json!({}),
            ),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.errors[0].contains("Missing input value"));
    assert_eq!(transport.requests().len(), 0);
}

#[tokio::test]
async fn post_without_body_template_sends_resolved_input() {
    let transport = ScriptedTransport::new(vec![ok(201, json!({ "id": "o-1" }))]);
    let runner = runner(transport.clone());

    let result = runner
        .run(
            invocation(
                HttpTaskSpec::new("POST", "http://api.test/orders"),
                &[("sku", "{{input.sku}}"), ("qty", "{{input.qty}}")],
                json!({ "sku": "a-1", "qty": 2 }),
            ),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TaskStatus::Succeeded);
    let requests = transport.requests();
    let body: Value = serde_json::from_slice(requests[0].0.body.as_ref().unwrap()).unwrap();
    assert_eq!(body, json!({ "sku": "a-1", "qty": 2 }));
    assert!(requests[0]
        .0
        .headers
        .iter()
        .any(|(name, value)| name == "content-type" && value == "application/json"));
}

#[tokio::test]
async fn composite_body_template_passes_json_through() {
    let transport = ScriptedTransport::new(vec![ok(200, json!({}))]);
    let runner = runner(transport.clone());

    let result = runner
        .run(
            invocation(
                HttpTaskSpec::new("POST", "http://api.test/orders")
                    .with_body("{{input.order}}"),
                &[("order", "{{input.order}}")],
                json!({ "order": { "sku": "a-1", "qty": 2 } }),
            ),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TaskStatus::Succeeded);
    let requests = transport.requests();
    let body: Value = serde_json::from_slice(requests[0].0.body.as_ref().unwrap()).unwrap();
    assert_eq!(body, json!({ "sku": "a-1", "qty": 2 }));
}

#[tokio::test]
async fn task_timeout_bounds_the_whole_retry_sequence() {
    let transport = ScriptedTransport::slow(
        vec![network_error(), network_error(), network_error(), network_error()],
        Duration::from_millis(30),
    );
    let runner = runner(transport.clone());

    let mut invocation = invocation(
        HttpTaskSpec::new("GET", "http://api.test/x"),
        &[],
        json!({}),
    );
    invocation.definition = invocation.definition.with_timeout("50ms");

    let result = runner.run(invocation, CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.errors[0].contains("Timed out"));
    // the timeout fired before the script could be exhausted
    assert!(transport.requests().len() < 4);
}

#[tokio::test]
async fn step_timeout_overrides_task_timeout() {
    let transport = ScriptedTransport::slow(vec![ok(200, json!({}))], Duration::from_millis(60));
    let runner = runner(transport.clone());

    let mut invocation = invocation(
        HttpTaskSpec::new("GET", "http://api.test/x"),
        &[],
        json!({}),
    );
    invocation.definition = invocation.definition.with_timeout("10s");
    invocation.timeout = Some("20ms".to_string());

    let result = runner.run(invocation, CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.errors[0].contains("Timed out"));
}

#[tokio::test]
async fn cancellation_aborts_promptly() {
    let transport = ScriptedTransport::slow(
        vec![ok(200, json!({}))],
        Duration::from_millis(200),
    );
    let runner = runner(transport.clone());
    let cancel = CancellationToken::new();

    let handle = {
        let cancel = cancel.clone();
        let invocation = invocation(
            HttpTaskSpec::new("GET", "http://api.test/x"),
            &[],
            json!({}),
        );
        tokio::spawn(async move { runner.run(invocation, cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    let result = handle.await.unwrap();

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.errors[0].contains("Cancelled"));
}
