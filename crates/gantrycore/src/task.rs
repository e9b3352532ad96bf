use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// A named, reusable unit of work. Immutable once loaded from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Upper bound on the whole execute-with-retries sequence, as a
    /// duration string ("250ms", "30s", "5m").
    pub timeout: Option<String>,
}

/// Closed set of task types. Dispatch stays exhaustive as variants grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskKind {
    Http(HttpTaskSpec),
}

/// HTTP task: method, URL, headers, and body are all templates resolved
/// against the step's input at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTaskSpec {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
}

impl TaskDefinition {
    pub fn http(name: impl Into<String>, spec: HttpTaskSpec) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::Http(spec),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Parsed per-task timeout, if one is declared.
    pub fn timeout_duration(&self) -> Result<Option<Duration>, TaskError> {
        self.timeout.as_deref().map(parse_duration).transpose()
    }
}

impl HttpTaskSpec {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            input_schema: None,
            output_schema: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Parse a duration string: integer count plus one of `ms`, `s`, `m`, `h`.
pub fn parse_duration(text: &str) -> Result<Duration, TaskError> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .filter(|&i| i > 0)
        .ok_or_else(|| TaskError::Configuration(format!("invalid duration: '{}'", text)))?;
    let (count, unit) = text.split_at(split);
    let count: u64 = count
        .parse()
        .map_err(|_| TaskError::Configuration(format!("invalid duration: '{}'", text)))?;

    match unit {
        "ms" => Ok(Duration::from_millis(count)),
        "s" => Ok(Duration::from_secs(count)),
        "m" => Ok(Duration::from_secs(count * 60)),
        "h" => Ok(Duration::from_secs(count * 3600)),
        _ => Err(TaskError::Configuration(format!(
            "invalid duration unit in '{}'",
            text
        ))),
    }
}
