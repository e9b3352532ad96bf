//! The `{{...}}` template language.
//!
//! Templates interleave literal text with expressions referencing the
//! workflow input (`{{input.user.id}}`) or a prior step's output
//! (`{{tasks.fetch-user.output.email}}`). Parsing and resolution are pure
//! and synchronous; the same parser backs design-time dependency extraction
//! and runtime substitution.

use crate::context::TemplateContext;
use crate::error::TemplateError;
use serde_json::Value;

/// One parsed `{{...}}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateExpression {
    /// `input.<path>`: lookup inside the workflow input.
    Input { path: Vec<String> },
    /// `tasks.<step>.output.<path>`: lookup inside a completed step's output.
    TaskOutput { step_id: String, path: Vec<String> },
}

/// A parsed template: literal runs and expressions, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Expression(TemplateExpression),
}

/// Parse a template into its segments.
pub fn parse(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 2..];
        let close = after.find("}}").ok_or_else(|| TemplateError::InvalidSyntax {
            expr: rest[open..].to_string(),
        })?;
        let expr = parse_expression(after[..close].trim())?;
        segments.push(Segment::Expression(expr));
        rest = &after[close + 2..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

/// Extract every task-output and input reference from a template.
///
/// Used by the graph builder to derive dependency edges without resolving
/// anything.
pub fn extract_references(template: &str) -> Result<Vec<TemplateExpression>, TemplateError> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Expression(expr) => Some(expr),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Resolve a template against a context.
///
/// A template that is exactly one expression yields the raw resolved value,
/// so composite JSON passes through unchanged. Anything else stringifies
/// each substitution and concatenates with the literal text.
pub fn resolve(template: &str, context: &TemplateContext) -> Result<Value, TemplateError> {
    let segments = parse(template)?;

    if let [Segment::Expression(expr)] = segments.as_slice() {
        return Ok(resolve_expression(expr, context)?.clone());
    }

    let mut out = String::new();
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expression(expr) => {
                out.push_str(&stringify(resolve_expression(expr, context)?));
            }
        }
    }
    Ok(Value::String(out))
}

/// Resolve a template to a plain string (URL components, headers).
pub fn resolve_to_string(
    template: &str,
    context: &TemplateContext,
) -> Result<String, TemplateError> {
    Ok(stringify(&resolve(template, context)?))
}

fn parse_expression(text: &str) -> Result<TemplateExpression, TemplateError> {
    let invalid = || TemplateError::InvalidSyntax {
        expr: text.to_string(),
    };

    if text.is_empty() {
        return Err(invalid());
    }
    let segments: Vec<&str> = text.split('.').collect();
    if !segments.iter().all(|s| is_identifier(s)) {
        return Err(invalid());
    }

    match segments[0] {
        "input" => Ok(TemplateExpression::Input {
            path: segments[1..].iter().map(|s| s.to_string()).collect(),
        }),
        "tasks" => {
            // tasks.<step>.output[.path...]
            if segments.len() < 3 || segments[2] != "output" {
                return Err(invalid());
            }
            Ok(TemplateExpression::TaskOutput {
                step_id: segments[1].to_string(),
                path: segments[3..].iter().map(|s| s.to_string()).collect(),
            })
        }
        _ => Err(invalid()),
    }
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn resolve_expression<'a>(
    expr: &TemplateExpression,
    context: &'a TemplateContext,
) -> Result<&'a Value, TemplateError> {
    match expr {
        TemplateExpression::Input { path } => {
            traverse(context.input(), path).ok_or_else(|| TemplateError::MissingInput {
                path: reference_path("input", path),
            })
        }
        TemplateExpression::TaskOutput { step_id, path } => {
            let output =
                context
                    .output(step_id)
                    .ok_or_else(|| TemplateError::MissingTaskOutput {
                        step_id: step_id.clone(),
                    })?;
            traverse(output, path).ok_or_else(|| TemplateError::MissingInput {
                path: reference_path(&format!("tasks.{}.output", step_id), path),
            })
        }
    }
}

/// Walk a dotted path through a JSON value: object fields by key, array
/// elements by numeric index.
fn traverse<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Textual form of a resolved value: strings bare, scalars via their natural
/// representation, composites as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        composite => composite.to_string(),
    }
}

fn reference_path(root: &str, path: &[String]) -> String {
    if path.is_empty() {
        root.to_string()
    } else {
        format!("{}.{}", root, path.join("."))
    }
}
