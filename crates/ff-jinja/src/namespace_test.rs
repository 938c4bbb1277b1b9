use super::*;
use crate::macros::parse_macros;

fn defs(package: &str, path: &str, source: &str) -> Vec<Arc<MacroDef>> {
    parse_macros(package, path, source)
        .unwrap()
        .macros
        .into_iter()
        .map(Arc::new)
        .collect()
}

fn fixture() -> Vec<Arc<MacroDef>> {
    let mut all = Vec::new();
    all.extend(defs(
        BUILTIN_PACKAGE,
        "macros/core.sql",
        "{% macro helper() %}builtin{% endmacro %}{% macro only_builtin() %}{% endmacro %}\
         {% materialization view, default %}{% endmaterialization %}",
    ));
    all.extend(defs(
        "jaffle",
        "macros/a.sql",
        "{% macro helper() %}jaffle{% endmacro %}{% docs helper %}d{% enddocs %}",
    ));
    all.extend(defs(
        "utils",
        "macros/u.sql",
        "{% macro helper() %}utils{% endmacro %}{% macro surrogate_key(cols) %}{% endmacro %}\
         {% materialization view, adapter='redshift' %}{% endmaterialization %}",
    ));
    all
}

#[test]
fn test_current_package_wins_over_builtin() {
    let ns = MacroNamespace::build(&fixture(), "jaffle");
    assert_eq!(ns.get("helper", None).unwrap().package_name, "jaffle");
    assert_eq!(
        ns.get("only_builtin", None).unwrap().package_name,
        BUILTIN_PACKAGE
    );
}

#[test]
fn test_other_packages_only_qualified() {
    let ns = MacroNamespace::build(&fixture(), "jaffle");
    assert!(ns.get("surrogate_key", None).is_none());
    assert_eq!(
        ns.get("surrogate_key", Some("utils")).unwrap().unique_id.to_string(),
        "macro.utils.surrogate_key"
    );
    assert_eq!(
        ns.get("helper", Some(BUILTIN_PACKAGE)).unwrap().package_name,
        BUILTIN_PACKAGE
    );
}

#[test]
fn test_resolution_does_not_depend_on_input_order() {
    let mut reversed = fixture();
    reversed.reverse();
    let ns = MacroNamespace::build(&reversed, "jaffle");
    assert_eq!(ns.get("helper", None).unwrap().package_name, "jaffle");
}

#[test]
fn test_last_definition_within_package_wins() {
    let mut all = defs("jaffle", "macros/a.sql", "{% macro m() %}a{% endmacro %}");
    all.extend(defs("jaffle", "macros/b.sql", "{% macro m() %}b{% endmacro %}"));
    let ns = MacroNamespace::build(&all, "jaffle");
    assert_eq!(ns.get("m", None).unwrap().path, "macros/b.sql");
    assert_eq!(ns.len(), 1);
}

#[test]
fn test_docs_are_not_exposed() {
    let ns = MacroNamespace::build(&fixture(), "jaffle");
    assert!(ns
        .get("helper", Some("jaffle"))
        .is_some_and(|def| !def.key.is_docs()));
    assert_eq!(ns.len(), 7);
}

#[test]
fn test_materialization_adapter_override_and_fallback() {
    let ns = MacroNamespace::build(&fixture(), "jaffle");
    assert_eq!(
        ns.materialization("view", "redshift").unwrap().package_name,
        "utils"
    );
    assert_eq!(
        ns.materialization("view", "postgres").unwrap().name,
        "materialization_view_default"
    );
    assert!(ns.materialization("table", "postgres").is_none());
}

#[test]
fn test_to_values_layout() {
    let ns = MacroNamespace::build(&fixture(), "jaffle");
    let values = ns.to_values(|def| Value::from(def.unique_id.to_string()));
    assert_eq!(values["helper"].as_str(), Some("macro.jaffle.helper"));
    let utils = &values["utils"];
    assert_eq!(
        utils.get_attr("surrogate_key").unwrap().as_str(),
        Some("macro.utils.surrogate_key")
    );
    assert!(values.contains_key(BUILTIN_PACKAGE));
}
