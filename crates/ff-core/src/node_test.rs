use super::*;

#[test]
fn parse_model_id() {
    let id = UniqueId::parse("model.analytics.orders").unwrap();
    assert_eq!(id.resource_type(), NodeType::Model);
    assert_eq!(id.package(), "analytics");
    assert_eq!(id.name(), "orders");
    assert_eq!(id.to_string(), "model.analytics.orders");
}

#[test]
fn parse_source_id_keeps_two_part_name() {
    let id = UniqueId::parse("source.analytics.raw.orders").unwrap();
    assert_eq!(id.resource_type(), NodeType::Source);
    assert_eq!(id.name(), "raw.orders");
}

#[test]
fn parse_rejects_too_few_segments() {
    let err = UniqueId::parse("model.orders").unwrap_err();
    assert_eq!(err.to_string(), "[E001] unique_id model.orders is malformed");
}

#[test]
fn parse_rejects_dotted_model_name() {
    let err = UniqueId::parse("model.analytics.orders.v2").unwrap_err();
    assert!(matches!(err, CoreError::InvalidNodeName { .. }), "{err}");
}

#[test]
fn parse_rejects_single_part_source_name() {
    let err = UniqueId::parse("source.analytics.orders").unwrap_err();
    assert!(matches!(err, CoreError::InvalidNodeName { .. }), "{err}");
}

#[test]
fn parse_rejects_unknown_type() {
    let err = UniqueId::parse("widget.analytics.orders").unwrap_err();
    assert!(matches!(err, CoreError::UnknownResourceType { .. }));
}

#[test]
fn unique_id_serde_uses_string_form() {
    let id = UniqueId::parse("macro.featherflow.wrap").unwrap();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"macro.featherflow.wrap\"");
    let back: UniqueId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
    assert!(serde_json::from_str::<UniqueId>("\"macro.wrap\"").is_err());
}

#[test]
fn id_matches_by_name_type_and_package() {
    let types = [NodeType::Model, NodeType::Analysis];
    assert!(id_matches("model.analytics.orders", "orders", None, &types).unwrap());
    assert!(id_matches("model.analytics.orders", "orders", Some("analytics"), &types).unwrap());
    assert!(!id_matches("model.analytics.orders", "orders", Some("other"), &types).unwrap());
    assert!(!id_matches("model.analytics.orders", "customers", None, &types).unwrap());
    assert!(!id_matches("seed.analytics.orders", "orders", None, &types).unwrap());
}

#[test]
fn id_matches_propagates_malformed_ids() {
    assert!(id_matches("orders", "orders", None, &[NodeType::Model]).is_err());
}

#[test]
fn ephemeral_cte_name_is_prefixed() {
    assert_eq!(ephemeral_cte_name("stg_orders"), "__ff__CTE__stg_orders");
}

#[test]
fn set_cte_replaces_in_place() {
    let mut node = Node::model("analytics", "orders", "select 1").unwrap();
    node.set_cte("model.analytics.a", "a as (select 1)");
    node.set_cte("model.analytics.b", "b as (select 2)");
    node.set_cte("model.analytics.a", "a as (select 10)");

    assert_eq!(node.extra_ctes.len(), 2);
    assert_eq!(node.extra_ctes[0].id, "model.analytics.a");
    assert_eq!(node.extra_ctes[0].sql, "a as (select 10)");
    assert_eq!(node.extra_ctes[1].id, "model.analytics.b");
}

#[test]
fn injected_sql_sets_flag() {
    let mut node = Node::model("analytics", "orders", "select 1").unwrap();
    assert!(!node.extra_ctes_injected());
    node.set_injected_sql("select 1".to_string());
    assert!(node.extra_ctes_injected());
    assert_eq!(node.injected_sql(), Some("select 1"));
}

#[test]
fn artifact_mirrors_compilation_fields() {
    let mut node = Node::model("analytics", "orders", "select 1").unwrap();
    node.compiled = true;
    node.compiled_sql = Some("select 1".to_string());
    node.set_injected_sql("select 1".to_string());
    node.wrapped_sql = Some("create view orders as (select 1)".to_string());

    let artifact = node.artifact();
    assert!(artifact.compiled);
    assert!(artifact.extra_ctes_injected);
    assert_eq!(artifact.injected_sql.as_deref(), Some("select 1"));
    assert_eq!(
        artifact.wrapped_sql.as_deref(),
        Some("create view orders as (select 1)")
    );
    let json = serde_json::to_value(&artifact).unwrap();
    assert!(json.get("extra_ctes").unwrap().as_array().unwrap().is_empty());
}

#[test]
fn checksum_is_stable() {
    let a = Node::model("analytics", "orders", "select 1").unwrap();
    let b = Node::model("other", "orders", "select 1").unwrap();
    assert_eq!(a.checksum(), b.checksum());
    assert_eq!(a.checksum().len(), 64);
    assert_eq!(a.artifact().checksum, a.checksum());
}

#[test]
fn node_deserializes_with_defaults() {
    let yaml = r#"
unique_id: model.analytics.orders
name: orders
package_name: analytics
resource_type: model
raw_sql: "select * from {{ ref('stg_orders') }}"
config:
  materialized: ephemeral
"#;
    let node: Node = serde_yaml::from_str(yaml).unwrap();
    assert!(node.is_ephemeral());
    assert!(!node.compiled);
    assert!(node.extra_ctes.is_empty());
    assert!(node.depends_on.is_empty());
}

#[test]
fn injected_flag_follows_injected_sql_when_loaded() {
    let base = r#"
unique_id: model.analytics.orders
name: orders
package_name: analytics
resource_type: model
raw_sql: select 1
extra_ctes_injected: true
"#;
    let node: Node = serde_yaml::from_str(base).unwrap();
    assert!(!node.extra_ctes_injected());
    assert_eq!(node.injected_sql(), None);
    assert!(!node.artifact().extra_ctes_injected);

    let node: Node = serde_yaml::from_str(&format!("{base}injected_sql: select 1\n")).unwrap();
    assert!(node.extra_ctes_injected());
    assert_eq!(node.injected_sql(), Some("select 1"));
}
