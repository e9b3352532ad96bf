use gantrycore::{
    EngineError, GraphError, HttpTaskSpec, InMemoryCatalog, TaskDefinition, TaskStep,
    WorkflowDefinition,
};
use gantryruntime::plan;
use serde_json::json;

fn catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    catalog.insert_task(TaskDefinition::http(
        "fetch",
        HttpTaskSpec::new("GET", "http://api.test/{{input.id}}"),
    ));
    catalog
}

#[test]
fn plan_reports_levels_and_static_resolutions() {
    let workflow = WorkflowDefinition::new("planned")
        .with_step(TaskStep::new("a", "fetch").with_input("id", "{{input.id}}"))
        .with_step(TaskStep::new("b", "fetch").with_input("id", "{{tasks.a.output.next}}"))
        .with_output("final", "{{tasks.b.output.value}}");

    let plan = plan(&workflow, &catalog(), json!({ "id": "42" })).unwrap();

    assert_eq!(plan.workflow, "planned");
    assert_eq!(plan.levels, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    assert_eq!(plan.resolved.get("a.id"), Some(&json!("42")));
    assert_eq!(plan.deferred, vec!["b.id".to_string(), "output.final".to_string()]);
    assert!(plan.issues.is_empty());
}

#[test]
fn plan_surfaces_cycles_with_their_path() {
    let workflow = WorkflowDefinition::new("cyclic")
        .with_step(TaskStep::new("a", "fetch").with_input("id", "{{tasks.b.output.x}}"))
        .with_step(TaskStep::new("b", "fetch").with_input("id", "{{tasks.a.output.x}}"));

    let err = plan(&workflow, &catalog(), json!({})).unwrap_err();
    match err {
        EngineError::Graph(GraphError::CircularDependency { cycle }) => {
            assert_eq!(cycle.first(), cycle.last());
        }
        other => panic!("expected cycle error, got {:?}", other),
    }
}

#[test]
fn plan_flags_missing_inputs_and_unknown_tasks() {
    let workflow = WorkflowDefinition::new("holes")
        .with_step(TaskStep::new("a", "unknown-task").with_input("id", "{{input.missing}}"));

    let plan = plan(&workflow, &catalog(), json!({ "id": "42" })).unwrap();

    assert!(plan
        .issues
        .iter()
        .any(|i| i.field == "task_ref" && i.message.contains("unknown-task")));
    assert!(plan
        .issues
        .iter()
        .any(|i| i.field == "id" && i.message.contains("input.missing")));
}

#[test]
fn plan_flags_template_syntax_errors() {
    let workflow = WorkflowDefinition::new("broken")
        .with_step(TaskStep::new("a", "fetch").with_input("id", "{{input.id"));

    let plan = plan(&workflow, &catalog(), json!({ "id": "42" })).unwrap();

    assert_eq!(plan.issues.len(), 1);
    assert!(plan.issues[0].message.contains("Invalid template syntax"));
}

#[test]
fn plan_performs_no_task_execution() {
    // a dry run of a workflow with unresolvable runtime references still
    // succeeds: nothing is executed, the references are just deferred
    let workflow = WorkflowDefinition::new("deferred-only")
        .with_step(TaskStep::new("a", "fetch").with_input("id", "{{tasks.a.output.loop}}"));

    let err = plan(&workflow, &catalog(), json!({}));
    // self-reference is a cycle, caught before any execution concern
    assert!(err.is_err());
}
