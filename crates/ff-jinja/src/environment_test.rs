use super::*;
use crate::context::TargetContext;
use ff_core::config::CompileFlags;

fn build(files: &[(&str, &str, &str)]) -> MacroEnvironment {
    let ctx = TemplateContext::new("jaffle", TargetContext::default(), CompileFlags::default())
        .with_vars([("start_date".to_string(), serde_json::json!("2024-01-01"))]);
    let mut builder = MacroEnvironment::builder(ctx).with_global_project().unwrap();
    for (package, path, source) in files {
        builder = builder.add_macro_file(package, path, source).unwrap();
    }
    builder.build().unwrap()
}

fn render(env: &MacroEnvironment, source: &str) -> CompileResult<String> {
    env.render(
        source,
        &env.namespace("jaffle"),
        BTreeMap::new(),
        Some("model.jaffle.m"),
    )
}

#[test]
fn test_render_plain_sql() {
    let env = build(&[]);
    assert_eq!(
        render(&env, "select * from users\n").unwrap(),
        "select * from users\n"
    );
}

#[test]
fn test_context_values_and_vars() {
    let env = build(&[]);
    let out = render(
        &env,
        "{{ project_name }} {{ target.schema }} {{ env.type }} {{ var('start_date') }} {{ flags.full_refresh | to_json }}",
    )
    .unwrap();
    assert_eq!(out, "jaffle public postgres 2024-01-01 false");
}

#[test]
fn test_macro_calls_sibling_and_sees_vars() {
    let env = build(&[(
        "jaffle",
        "macros/utils.sql",
        "{% macro cents(col) %}({{ col }} / 100){% endmacro %}\
         {% macro dollars(col) %}{{ cents(col) }}::numeric as {{ col }}_usd{% endmacro %}\
         {% macro since() %}'{{ var('start_date') }}'{% endmacro %}",
    )]);
    let out = render(
        &env,
        "select {{ dollars('amount') }} from t where d >= {{ since() }}",
    )
    .unwrap();
    assert_eq!(
        out,
        "select (amount / 100)::numeric as amount_usd from t where d >= '2024-01-01'"
    );
}

#[test]
fn test_macro_sees_per_render_values() {
    let env = build(&[(
        "jaffle",
        "macros/m.sql",
        "{% macro target_table() %}{{ this }}{% endmacro %}",
    )]);
    let ns = env.namespace("jaffle");
    for name in ["a", "b"] {
        let mut extra = BTreeMap::new();
        extra.insert("this".to_string(), Value::from(format!("\"public\".\"{name}\"")));
        let out = env
            .render("{{ target_table() }}", &ns, extra, None)
            .unwrap();
        assert_eq!(out, format!("\"public\".\"{name}\""));
    }
}

#[test]
fn test_qualified_macro_from_other_package() {
    let env = build(&[(
        "utils",
        "macros/u.sql",
        "{% macro surrogate_key(cols) %}md5({{ cols | join(\" || \") }}){% endmacro %}",
    )]);
    let out = render(&env, "{{ utils.surrogate_key(['a', 'b']) }}").unwrap();
    assert_eq!(out, "md5(a || b)");

    let err = render(&env, "{{ surrogate_key(['a']) }}").unwrap_err();
    assert!(
        matches!(err, CompileError::UndefinedReference { .. }),
        "{err}"
    );
}

#[test]
fn test_return_value() {
    let env = build(&[(
        "jaffle",
        "macros/r.sql",
        "{% macro columns() %}ignored{{ return(['a', 'b']) }}{% endmacro %}\
         {% macro first_column() %}{{ return(columns()[0]) }}{% endmacro %}",
    )]);
    let out = render(&env, "{{ columns() | length }} {{ first_column() }}").unwrap();
    assert_eq!(out, "2 a");
}

#[test]
fn test_return_outside_macro_is_error() {
    let env = build(&[]);
    let err = render(&env, "{{ return(1) }}").unwrap_err();
    assert!(err.message().contains("outside of a macro"), "{err}");
}

#[test]
fn test_call_stack_outermost_first() {
    let env = build(&[(
        "jaffle",
        "macros/stack.sql",
        "{% macro outer() %}{{ inner() }}{% endmacro %}\
         {% macro inner() %}{{ raise_compiler_error('inner failed') }}{% endmacro %}",
    )]);
    let err = render(&env, "select {{ outer() }}").unwrap_err();
    match &err {
        CompileError::MacroRuntime {
            node,
            message,
            stack,
        } => {
            assert_eq!(node.as_deref(), Some("model.jaffle.m"));
            assert_eq!(message, "inner failed");
            assert_eq!(stack, &["macro.jaffle.outer", "macro.jaffle.inner"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err
        .to_string()
        .contains("called by: macro.jaffle.outer -> macro.jaffle.inner"));
}

#[test]
fn test_arity_error_is_macro_runtime() {
    let env = build(&[(
        "jaffle",
        "macros/a.sql",
        "{% macro one(x) %}{{ x }}{% endmacro %}",
    )]);
    let err = render(&env, "{{ one(1, 2, 3) }}").unwrap_err();
    assert!(matches!(err, CompileError::MacroRuntime { .. }), "{err}");
    assert_eq!(err.stack(), ["macro.jaffle.one"]);
}

#[test]
fn test_undefined_variable_in_model() {
    let env = build(&[]);
    let err = render(&env, "select {{ missing_thing }}").unwrap_err();
    assert!(
        matches!(err, CompileError::UndefinedReference { .. }),
        "{err}"
    );
    assert_eq!(err.node(), Some("model.jaffle.m"));
}

#[test]
fn test_undefined_inside_nested_macro_keeps_call_stack() {
    let env = build(&[(
        "jaffle",
        "macros/nested.sql",
        "{% macro outer() %}{{ inner() }}{% endmacro %}\
         {% macro inner() %}{{ nope_not_defined }}{% endmacro %}",
    )]);
    let err = render(&env, "select {{ outer() }}").unwrap_err();
    assert!(
        matches!(err, CompileError::UndefinedReference { .. }),
        "{err}"
    );
    assert_eq!(err.node(), Some("model.jaffle.m"));
    assert_eq!(err.stack(), ["macro.jaffle.outer", "macro.jaffle.inner"]);
    assert!(
        err.message().contains("jaffle://macros/nested.sql"),
        "{err}"
    );
}

#[test]
fn test_syntax_error_in_model() {
    let env = build(&[]);
    let err = render(&env, "select {% if %}").unwrap_err();
    assert!(matches!(err, CompileError::TemplateSyntax { .. }), "{err}");
    assert_eq!(err.node(), Some("model.jaffle.m"));
}

#[test]
fn test_user_macro_cannot_shadow_internal_names() {
    let env = build(&[("jaffle", "macros/v.sql", "{% macro var(x) %}shadow{% endmacro %}")]);
    // The namespace entry wins for bare calls in the package that defines it.
    assert_eq!(render(&env, "{{ var('x') }}").unwrap(), "shadow");
    // The reserved internal name cannot be declared by user code.
    let err = MacroEnvironment::builder(TemplateContext::default())
        .add_macro_file("jaffle", "bad.sql", "{% macro __macro__var() %}{% endmacro %}")
        .unwrap_err();
    assert!(err.message().contains("reserved"), "{err}");
}

#[test]
fn test_call_macro_and_wrap() {
    let env = build(&[]);
    let ns = env.namespace("jaffle");
    let wrap = ns.get("wrap", None).unwrap().clone();
    let out = env
        .call_macro(
            &wrap,
            &[
                Value::from("select 1"),
                Value::from(vec!["grant a"]),
                Value::from(vec!["grant b", "vacuum"]),
            ],
            &ns,
            BTreeMap::new(),
            None,
        )
        .unwrap();
    assert_eq!(out.to_string(), "grant a;\nselect 1;\ngrant b;\nvacuum");
}

#[test]
fn test_render_docs() {
    let env = build(&[(
        "jaffle",
        "models/docs.md",
        "{% docs orders %}One row per {{ 'order' | upper }}.{% enddocs %}",
    )]);
    assert_eq!(env.render_docs("jaffle", "orders").unwrap(), "One row per ORDER.");
    assert!(env.render_docs("jaffle", "missing").is_err());
}

#[test]
fn test_add_macro_dir() {
    let temp = tempfile::TempDir::new().unwrap();
    let nested = temp.path().join("nested");
    std::fs::create_dir(&nested).unwrap();
    std::fs::write(
        nested.join("m.sql"),
        "{% macro greet(n) %}hi {{ n }}{% endmacro %}",
    )
    .unwrap();
    std::fs::write(temp.path().join("notes.txt"), "{% macro skipped() %}").unwrap();

    let env = MacroEnvironment::builder(TemplateContext::default())
        .add_macro_dir("jaffle", temp.path())
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(env.macros().len(), 1);
    assert_eq!(env.macros()[0].path, "nested/m.sql");
    let out = env
        .render("{{ greet('x') }}", &env.namespace("jaffle"), BTreeMap::new(), None)
        .unwrap();
    assert_eq!(out, "hi x");
}
