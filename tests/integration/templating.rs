use garden_core::core::ErrorKind;
use garden_core::template::{
    ContextResolveOpts, GenericContext, TemplateValue, collect_context_references, render_key_path,
    resolve_template_string, resolve_template_strings,
};
use garden_core::test_utils::init_test_logging;
use serde_json::json;

fn context() -> GenericContext {
    GenericContext::new()
        .with_value(
            "var",
            json!({
                "name": "api",
                "tag": "v1",
                "replicas": 3,
                "ports": [80, 443],
                "labels": { "team": "core" },
                "empty": "",
            }),
        )
        .with_value("project", json!({ "name": "demo" }))
        .with_pending("runtime")
}

fn resolve(template: &str) -> TemplateValue {
    resolve_template_string(template, &context(), &ContextResolveOpts::default()).unwrap().value
}

fn resolve_err(template: &str) -> String {
    resolve_template_string(template, &context(), &ContextResolveOpts::default()).unwrap_err().to_string()
}

#[test]
fn test_plain_strings_are_untouched() {
    init_test_logging(None);
    assert_eq!(resolve("just text"), TemplateValue::from("just text"));
    assert_eq!(resolve("$${var.name}"), TemplateValue::from("${var.name}"));
}

#[test]
fn test_single_expression_keeps_its_type() {
    assert_eq!(resolve("${var.replicas}"), TemplateValue::Number(3.0));
    assert_eq!(resolve("${var.ports}"), TemplateValue::from(vec![80i64, 443]));
    assert_eq!(resolve("${var.replicas > 1}"), TemplateValue::Bool(true));
}

#[test]
fn test_string_concatenation() {
    assert_eq!(resolve("${var.name}:${var.tag}"), TemplateValue::from("api:v1"));
    assert_eq!(resolve("${project.name}-${var.replicas}"), TemplateValue::from("demo-3"));

    let err = resolve_err("ports: ${var.ports}");
    assert!(err.contains("expected primitive") || err.contains("primitive"), "{err}");
}

#[test]
fn test_arithmetic_and_operand_types() {
    assert_eq!(resolve("${'x' + 'y'}"), TemplateValue::from("xy"));
    assert_eq!(resolve("${[1, 2] + [3]}"), TemplateValue::from(vec![1i64, 2, 3]));
    assert_eq!(resolve("${var.replicas * 2 - 1}"), TemplateValue::Number(5.0));

    let err = resolve_err("${1 + 'x'}");
    assert!(err.contains("number and string"), "{err}");
    let err = resolve_err("${var.name - 1}");
    assert!(err.contains("string and number"), "{err}");
}

#[test]
fn test_logical_operators_and_missing_keys() {
    assert_eq!(resolve("${var.missing && 'x'}"), TemplateValue::Bool(false));
    assert_eq!(resolve("${var.missing || 'fallback'}"), TemplateValue::from("fallback"));
    // The right side would fail if it were evaluated.
    assert_eq!(resolve("${var.name || jsonDecode('{')}"), TemplateValue::from("api"));
    assert_eq!(resolve("${var.empty || 'default'}"), TemplateValue::from("default"));
}

#[test]
fn test_ternary_short_circuits() {
    assert_eq!(resolve("${var.replicas > 1 ? 'ha' : jsonDecode('{')}"), TemplateValue::from("ha"));
    assert_eq!(resolve("${var.missing ? jsonDecode('{') : 'off'}"), TemplateValue::from("off"));
}

#[test]
fn test_contains() {
    assert_eq!(resolve("${'abc' contains 'b'}"), TemplateValue::Bool(true));
    assert_eq!(resolve("${[1, 2, 3] contains 4}"), TemplateValue::Bool(false));
    assert_eq!(resolve("${var.labels contains 'team'}"), TemplateValue::Bool(true));
    let err = resolve_err("${'abc' contains [1]}");
    assert!(err.contains("right-hand side"), "{err}");
}

#[test]
fn test_optional_suffix() {
    assert_eq!(resolve("${var.missing}?"), TemplateValue::Undefined);
    assert_eq!(resolve("image-${var.missing}?"), TemplateValue::from("image-"));

    let err = resolve_err("${var.missing}");
    assert!(err.contains("var.missing"), "{err}");
}

#[test]
fn test_conditional_blocks() {
    assert_eq!(
        resolve("${if var.replicas > 1}replicated${else}single${endif}"),
        TemplateValue::from("replicated")
    );
    assert_eq!(resolve("pre-${if var.replicas < 1}x${endif}-post"), TemplateValue::from("pre--post"));

    let err = resolve_err("${if var.name}x");
    assert!(err.contains("Missing ${endif}"), "{err}");
}

#[test]
fn test_helper_functions() {
    assert_eq!(resolve("${upper(var.name)}"), TemplateValue::from("API"));
    assert_eq!(resolve("${join(var.ports, ',')}"), TemplateValue::from("80,443"));

    let err = resolve_err("${uper(var.name)}");
    assert!(err.contains("Could not find helper function 'uper'"), "{err}");
    assert!(err.contains("Did you mean 'upper'?"), "{err}");

    let err = resolve_err("${jsonDecode('{')}");
    assert!(err.contains("Error from helper function jsonDecode"), "{err}");

    let err = resolve_err("${indent('a', 100000000000000000)}");
    assert!(err.contains("Error from helper function indent"), "{err}");
    let encoded = resolve("${jsonEncode([1], 100000000000000000)}");
    assert_eq!(encoded, TemplateValue::from(format!("[\n{}1\n]", " ".repeat(10))));
}

#[test]
fn test_errors_carry_location_and_kind() {
    let err = resolve_template_string("a\n${var.nope}", &context(), &ContextResolveOpts::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let details = err.as_template_error().unwrap();
    assert_eq!(details.location.line, 2);
    assert_eq!(details.template, "a\n${var.nope}");
}

#[test]
fn test_partial_resolution_leaves_template_unchanged() {
    let opts = ContextResolveOpts::partial();
    let resolved = resolve_template_string("${runtime.outputs.url}/api", &context(), &opts).unwrap();
    assert_eq!(resolved.value, TemplateValue::from("${runtime.outputs.url}/api"));

    // Without partial mode the same lookup fails.
    assert!(resolve_template_string("${runtime.outputs.url}", &context(), &ContextResolveOpts::default()).is_err());

    // A fallback doesn't hide a value that will be available later.
    let resolved = resolve_template_string("${runtime.url || 'x'}", &context(), &opts).unwrap();
    assert_eq!(resolved.value, TemplateValue::from("${runtime.url || 'x'}"));
}

#[test]
fn test_provenance_distinguishes_equal_values() {
    let context = GenericContext::new().with_value("var", json!({ "a": "same", "b": "same" }));
    let opts = ContextResolveOpts::default();
    let first = resolve_template_string("${var.a}", &context, &opts).unwrap();
    let second = resolve_template_string("${var.b}", &context, &opts).unwrap();

    assert_eq!(first.value, second.value);
    assert_ne!(first.inputs, second.inputs);

    let both = resolve_template_string("${var.a}${var.b}${var.a}", &context, &opts).unwrap();
    assert_eq!(both.inputs.into_iter().collect::<Vec<_>>(), vec!["var.a", "var.b"]);
}

#[test]
fn test_resolving_a_config_tree() {
    let tree = TemplateValue::from(json!({
        "image": "${var.name}:${var.tag}",
        "replicas": "${var.replicas}",
        "ports": ["${var.ports[0]}", 8080],
        "url": "${runtime.url}",
    }));
    let resolved = resolve_template_strings(&tree, &context(), &ContextResolveOpts::partial()).unwrap();

    assert_eq!(
        resolved.value.to_json(),
        json!({
            "image": "api:v1",
            "replicas": 3,
            "ports": [80, 8080],
            "url": "${runtime.url}",
        })
    );
    assert!(resolved.inputs.contains("var.ports[0]"));
    assert!(resolved.inputs.contains("var.tag"));

    let references: Vec<String> =
        collect_context_references(&tree).unwrap().iter().map(|path| render_key_path(path)).collect();
    assert!(references.contains(&"runtime.url".to_string()));
    assert!(references.contains(&"var.name".to_string()));
}

#[tokio::test]
async fn test_concurrent_evaluation_with_separate_contexts() {
    let handles: Vec<_> = (0..8)
        .map(|i| {
            tokio::spawn(async move {
                let context = GenericContext::new().with_value("var", json!({ "i": i }));
                resolve_template_string("${var.i * 2}", &context, &ContextResolveOpts::default()).map(|r| r.value)
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, TemplateValue::Number((i * 2) as f64));
    }
}
