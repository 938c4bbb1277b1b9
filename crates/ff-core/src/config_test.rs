use super::*;
use serde_json::json;

#[test]
fn test_node_config_defaults() {
    let config: NodeConfig = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.materialized, "view");
    assert!(config.enabled);
    assert!(config.pre_hook.is_empty());
    assert!(config.post_hook.is_empty());
    assert!(!config.is_ephemeral());
    assert_eq!(config, NodeConfig::default());
}

#[test]
fn test_hooks_accept_string_or_list() {
    let yaml = r#"
materialized: table
pre-hook: "grant usage on schema x to y"
post_hook:
  - "analyze {{ this }}"
  - "vacuum {{ this }}"
"#;
    let config: NodeConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.pre_hook, vec!["grant usage on schema x to y"]);
    assert_eq!(config.post_hook.len(), 2);
    assert_eq!(config.post_hook[1], "vacuum {{ this }}");
}

#[test]
fn test_extra_keys_are_retained() {
    let yaml = r#"
materialized: incremental
sql_where: "id > (select max(id) from {{ this }})"
bind: false
"#;
    let config: NodeConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.extra.get("bind"), Some(&json!(false)));
    assert!(config.sql_where.is_some());
}

#[test]
fn test_apply_known_and_unknown_keys() {
    let mut config = NodeConfig::default();
    config.apply("materialized", json!("ephemeral")).unwrap();
    config.apply("post_hook", json!("grant select on t to r")).unwrap();
    config.apply("dist", json!("user_id")).unwrap();
    config.apply("partition_by", json!(["day"])).unwrap();

    assert!(config.is_ephemeral());
    assert_eq!(config.post_hook, vec!["grant select on t to r"]);
    assert_eq!(config.dist, Some(json!("user_id")));
    assert_eq!(config.extra.get("partition_by"), Some(&json!(["day"])));
}

#[test]
fn test_apply_rejects_bad_type() {
    let mut config = NodeConfig::default();
    let err = config.apply("materialized", json!(3)).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }), "{err}");
    assert_eq!(config.materialized, "view", "failed apply must not mutate");
}

#[test]
fn test_non_string_dist_survives_parsing() {
    let config: NodeConfig = serde_yaml::from_str("dist: [a, b]").unwrap();
    assert_eq!(config.dist, Some(json!(["a", "b"])));
}

#[test]
fn test_compile_flags_builder() {
    let flags = CompileFlags::default();
    assert!(flags.use_cache);
    assert!(!flags.warnings_are_errors());

    let flags = flags.with_strict(true).with_non_destructive(true);
    assert!(flags.non_destructive);
    assert!(flags.warnings_are_errors());
    assert!(!flags.full_refresh);

    let flags = CompileFlags::default()
        .with_use_cache(false)
        .with_warn_error(true);
    assert!(!flags.use_cache);
    assert!(!flags.strict);
    assert!(flags.warnings_are_errors());
}

#[test]
fn test_parse_minimal_project_config() {
    let config: ProjectConfig = serde_yaml::from_str("name: analytics").unwrap();
    assert_eq!(config.name, "analytics");
    assert_eq!(config.target.schema, "public");
    assert_eq!(config.target.adapter_type, "postgres");
    assert_eq!(config.macro_paths, vec!["macros"]);
    assert_eq!(config.flags, CompileFlags::default());
}

#[test]
fn test_parse_full_project_config() {
    let yaml = r#"
name: analytics
vars:
  start_date: "2024-01-01"
target:
  name: prod
  schema: analytics
  type: redshift
macro_paths: [macros, shared_macros]
flags:
  non_destructive: true
"#;
    let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.target.adapter_type, "redshift");
    assert_eq!(config.target.name, "prod");
    assert!(config.flags.non_destructive);
    assert!(config.flags.use_cache);
    let root = Path::new("/tmp/project");
    assert_eq!(
        config.macro_paths_absolute(root),
        vec![root.join("macros"), root.join("shared_macros")]
    );
}

#[test]
fn test_unknown_project_key_rejected() {
    let result: Result<ProjectConfig, _> = serde_yaml::from_str("name: a\nmodels_dir: x");
    assert!(result.is_err());
}

#[test]
fn test_load_from_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("featherflow.yml"), "name: loaded\n").unwrap();
    let config = ProjectConfig::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.name, "loaded");
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ProjectConfig::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}

#[test]
fn test_load_empty_name_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("featherflow.yml");
    std::fs::write(&path, "name: ''\n").unwrap();
    let err = ProjectConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("[E006]"), "{err}");
}

#[test]
fn test_parse_cli_vars_mapping() {
    let vars = parse_cli_vars("{start_date: '2024-01-01', limit: 10}").unwrap();
    assert_eq!(
        vars.get("start_date"),
        Some(&serde_yaml::Value::String("2024-01-01".to_string()))
    );
    assert_eq!(vars.len(), 2);
}

#[test]
fn test_parse_cli_vars_blank_is_empty() {
    assert!(parse_cli_vars("  ").unwrap().is_empty());
}

#[test]
fn test_parse_cli_vars_rejects_non_mapping() {
    let err = parse_cli_vars("[1, 2]").unwrap_err();
    assert_eq!(
        err.to_string(),
        "[E007] The --vars argument must be a YAML dictionary, but was of type 'sequence'"
    );
}

#[test]
fn test_merge_vars_overrides() {
    let mut config: ProjectConfig =
        serde_yaml::from_str("name: a\nvars:\n  x: 1\n  y: 2").unwrap();
    config.merge_vars(parse_cli_vars("x: 5").unwrap());
    assert_eq!(config.vars.get("x"), Some(&serde_yaml::Value::from(5)));
    assert_eq!(config.vars.get("y"), Some(&serde_yaml::Value::from(2)));
}
