use super::*;
use crate::dialect::{PostgresDialect, RedshiftDialect};

fn frag(id: &str, sql: &str) -> CteFragment {
    CteFragment::new(id, sql)
}

fn inject(sql: &str, ctes: &[CteFragment]) -> String {
    inject_ctes(&PostgresDialect::new(), sql, ctes).unwrap()
}

#[test]
fn test_empty_fragment_list_is_identity() {
    for sql in [
        "select * from t",
        "  WITH x AS (select 1)\nselect * from x;  ",
        "",
        "-- only a comment",
        "select 'unterminated",
    ] {
        assert_eq!(inject(sql, &[]), sql);
    }
}

#[test]
fn test_synthesizes_with_clause() {
    let result = inject("select * from t", &[frag("a", "a_cte as (select 1)")]);
    assert_eq!(result, "with a_cte as (select 1) select * from t");
    assert!(result.starts_with("with a_cte as (select 1)"));
    assert!(result.ends_with("select * from t"));
}

#[test]
fn test_merges_into_existing_with_clause() {
    let sql = "with x as (select 1) select * from x";
    let result = inject(sql, &[frag("a", "a_cte as (select 1)")]);
    assert_eq!(
        result,
        "with a_cte as (select 1), x as (select 1) select * from x"
    );
    let injected = result.find("a_cte as (select 1)").unwrap();
    let original = result.find("x as (select 1)").unwrap();
    assert!(injected < original);
    assert!(result.ends_with(" x as (select 1) select * from x"));
}

#[test]
fn test_fragment_order_is_preserved() {
    let result = inject(
        "select * from b",
        &[
            frag("model.pkg.a", "a as (select 1)"),
            frag("model.pkg.b", "b as (select * from a)"),
        ],
    );
    assert_eq!(
        result,
        "with a as (select 1), b as (select * from a) select * from b"
    );
}

#[test]
fn test_uppercase_with_and_leading_comment() {
    let sql = "/* header */\nWITH x AS (SELECT 1)\nSELECT * FROM x";
    let result = inject(sql, &[frag("a", "a as (select 2)")]);
    assert_eq!(
        result,
        "/* header */\nWITH a as (select 2), x AS (SELECT 1)\nSELECT * FROM x"
    );
}

#[test]
fn test_leading_whitespace_kept_before_synthesized_with() {
    let result = inject("\n  select 1", &[frag("a", "a as (select 2)")]);
    assert_eq!(result, "\n  with a as (select 2) select 1");
}

#[test]
fn test_with_recursive_keeps_recursive_keyword_first() {
    let sql = "with recursive r(n) as (select 1 union all select n + 1 from r) select * from r";
    let result = inject(sql, &[frag("a", "a as (select 1)")]);
    assert!(
        result.starts_with("with recursive a as (select 1), r(n) as"),
        "{result}"
    );
}

#[test]
fn test_multibyte_text_before_with() {
    let sql = "-- résumé ✓\nwith x as (select 'ü') select * from x";
    let result = inject(sql, &[frag("a", "a as (select 1)")]);
    assert_eq!(
        result,
        "-- résumé ✓\nwith a as (select 1), x as (select 'ü') select * from x"
    );
}

#[test]
fn test_injected_sql_parses() {
    let dialect = RedshiftDialect::new();
    let sql = "with x as (select 1 as id) select * from x join __ff__CTE__a using (id)";
    let result = inject_ctes(
        &dialect,
        sql,
        &[frag("model.pkg.a", "__ff__CTE__a as (select 1 as id)")],
    )
    .unwrap();
    let statements =
        sqlparser::parser::Parser::parse_sql(dialect.parser_dialect(), &result).unwrap();
    assert_eq!(statements.len(), 1);
}

#[test]
fn test_tokenize_failure_surfaces_when_injecting() {
    let err = inject_ctes(
        &PostgresDialect::new(),
        "select 'unterminated",
        &[frag("a", "a as (select 1)")],
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("[S002]"), "{err}");
}

#[test]
fn test_collect_ephemeral_fragments_innermost_first() {
    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    deps.insert("fct".to_string(), vec!["stg_a".to_string(), "dim".to_string()]);
    deps.insert("stg_a".to_string(), vec!["stg_raw".to_string()]);
    deps.insert("stg_raw".to_string(), vec!["raw".to_string()]);

    let fragments = collect_ephemeral_fragments(
        "fct",
        &deps,
        |id| id.starts_with("stg_"),
        |id| Some(frag(id, &format!("{id} as (select 1)"))),
    )
    .unwrap();
    let ids: Vec<&str> = fragments.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["stg_raw", "stg_a"]);
}

#[test]
fn test_collect_fails_on_uncompiled_ephemeral() {
    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    deps.insert("fct".to_string(), vec!["stg_a".to_string(), "stg_b".to_string()]);

    let err = collect_ephemeral_fragments(
        "fct",
        &deps,
        |_| true,
        |id| (id == "stg_b").then(|| frag(id, "stg_b as (select 1)")),
    )
    .unwrap_err();
    assert_eq!(err, SqlError::UncompiledDependency("stg_a".to_string()));
    assert!(err.to_string().starts_with("[S001]"), "{err}");
}

#[test]
fn test_collect_visits_shared_dependency_once() {
    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    deps.insert("fct".to_string(), vec!["a".to_string(), "b".to_string()]);
    deps.insert("a".to_string(), vec!["shared".to_string()]);
    deps.insert("b".to_string(), vec!["shared".to_string()]);

    let fragments = collect_ephemeral_fragments(
        "fct",
        &deps,
        |_| true,
        |id| Some(frag(id, &format!("{id} as (select 1)"))),
    )
    .unwrap();
    let ids: Vec<&str> = fragments.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["shared", "a", "b"]);
}
