use gantrycore::template::{self, Segment, TemplateExpression};
use gantrycore::{TemplateContext, TemplateError};
use serde_json::json;

fn context() -> TemplateContext {
    let mut ctx = TemplateContext::new(json!({
        "userId": "u-42",
        "count": 7,
        "flag": true,
        "user": { "address": { "city": "Oslo" } },
        "items": [ { "sku": "a" }, { "sku": "b" } ],
    }));
    ctx.insert_output(
        "fetch-user",
        json!({ "email": "ada@example.com", "roles": ["admin", "ops"] }),
    );
    ctx
}

#[test]
fn literal_template_passes_through_unchanged() {
    let resolved = template::resolve("plain text, no placeholders", &context()).unwrap();
    assert_eq!(resolved, json!("plain text, no placeholders"));
}

#[test]
fn single_expression_resolves_to_raw_value() {
    let ctx = context();
    assert_eq!(template::resolve("{{input.userId}}", &ctx).unwrap(), json!("u-42"));
    assert_eq!(template::resolve("{{input.count}}", &ctx).unwrap(), json!(7));
    assert_eq!(template::resolve("{{input.flag}}", &ctx).unwrap(), json!(true));
}

#[test]
fn single_composite_expression_preserves_structure() {
    let resolved = template::resolve("{{input.user.address}}", &context()).unwrap();
    assert_eq!(resolved, json!({ "city": "Oslo" }));

    let roles = template::resolve("{{tasks.fetch-user.output.roles}}", &context()).unwrap();
    assert_eq!(roles, json!(["admin", "ops"]));
}

#[test]
fn mixed_template_stringifies_and_concatenates() {
    let resolved =
        template::resolve("user {{input.userId}} has {{input.count}} items", &context()).unwrap();
    assert_eq!(resolved, json!("user u-42 has 7 items"));
}

#[test]
fn composite_in_mixed_template_serializes_to_compact_json() {
    let resolved = template::resolve("address: {{input.user.address}}", &context()).unwrap();
    assert_eq!(resolved, json!(r#"address: {"city":"Oslo"}"#));
}

#[test]
fn nested_path_traversal_walks_objects_and_arrays() {
    let ctx = context();
    assert_eq!(
        template::resolve("{{input.user.address.city}}", &ctx).unwrap(),
        json!("Oslo")
    );
    assert_eq!(
        template::resolve("{{input.items.1.sku}}", &ctx).unwrap(),
        json!("b")
    );
}

#[test]
fn task_output_reference_resolves_against_completed_steps() {
    let resolved = template::resolve("{{tasks.fetch-user.output.email}}", &context()).unwrap();
    assert_eq!(resolved, json!("ada@example.com"));
}

#[test]
fn missing_input_names_the_full_path() {
    let err = template::resolve("{{input.user.zipcode}}", &context()).unwrap_err();
    match err {
        TemplateError::MissingInput { path } => assert_eq!(path, "input.user.zipcode"),
        other => panic!("expected MissingInput, got {:?}", other),
    }
}

#[test]
fn unknown_step_reports_missing_task_output() {
    let err = template::resolve("{{tasks.nope.output.x}}", &context()).unwrap_err();
    match err {
        TemplateError::MissingTaskOutput { step_id } => assert_eq!(step_id, "nope"),
        other => panic!("expected MissingTaskOutput, got {:?}", other),
    }
}

#[test]
fn unterminated_expression_is_a_syntax_error() {
    let err = template::resolve("hello {{input.userId", &context()).unwrap_err();
    assert!(matches!(err, TemplateError::InvalidSyntax { .. }));
}

#[test]
fn bad_root_and_missing_output_segment_are_syntax_errors() {
    for template in ["{{bogus.x}}", "{{tasks.a.result.x}}", "{{tasks.a}}", "{{}}"] {
        let err = template::resolve(template, &context()).unwrap_err();
        assert!(
            matches!(err, TemplateError::InvalidSyntax { .. }),
            "expected syntax error for {}",
            template
        );
    }
}

#[test]
fn parse_splits_literals_and_expressions_in_order() {
    let segments = template::parse("a {{input.x}} b").unwrap();
    assert_eq!(
        segments,
        vec![
            Segment::Literal("a ".to_string()),
            Segment::Expression(TemplateExpression::Input {
                path: vec!["x".to_string()]
            }),
            Segment::Literal(" b".to_string()),
        ]
    );
}

#[test]
fn extract_references_finds_every_expression() {
    let refs =
        template::extract_references("{{input.a}}/{{tasks.s1.output.b}}/{{tasks.s2.output}}")
            .unwrap();
    assert_eq!(refs.len(), 3);
    assert_eq!(
        refs[1],
        TemplateExpression::TaskOutput {
            step_id: "s1".to_string(),
            path: vec!["b".to_string()],
        }
    );
    assert_eq!(
        refs[2],
        TemplateExpression::TaskOutput {
            step_id: "s2".to_string(),
            path: vec![],
        }
    );
}

#[test]
fn bare_input_reference_yields_whole_input() {
    let ctx = TemplateContext::new(json!({ "k": "v" }));
    assert_eq!(template::resolve("{{input}}", &ctx).unwrap(), json!({ "k": "v" }));
}

#[test]
fn resolution_is_deterministic_for_a_fixed_context() {
    let ctx = context();
    let first = template::resolve("{{input.user.address}} / {{input.count}}", &ctx).unwrap();
    let second = template::resolve("{{input.user.address}} / {{input.count}}", &ctx).unwrap();
    assert_eq!(first, second);
}
