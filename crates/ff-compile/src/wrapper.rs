//! Materialization wrapping
//!
//! Turns a node's injected `select` into the statement that persists it:
//! validate the strategy, derive the identifier and qualifiers, call the
//! strategy's materialization macro with the options it declares, interleave
//! the hooks and render the result once more.

use std::collections::BTreeMap;
use std::sync::Arc;

use ff_core::config::NodeConfig;
use ff_core::node::Node;
use ff_jinja::{CompileError, CompileResult, MacroEnvironment, MacroNamespace};
use minijinja::value::Kwargs;
use minijinja::Value;

use crate::adapter::{Adapter, AdapterFuncs};

/// Strategies every adapter supports
pub const BUILTIN_STRATEGIES: [&str; 3] = ["incremental", "table", "view"];

/// Suffix of the identifier a destructive build writes to first
pub const TMP_SUFFIX: &str = "__ff_tmp";

const DEFAULT_SORT_TYPE: &str = "compound";

/// Options derived from a node's config before any macro runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapOptions {
    pub materialization: String,
    pub schema: String,
    pub identifier: String,
    /// Adapter distribution clause, empty when not configured
    pub dist: String,
    /// Adapter sort clause, empty when not configured
    pub sort: String,
    pub sql_where: Option<String>,
    pub unique_key: Option<String>,
    pub pre_hooks: Vec<String>,
    pub post_hooks: Vec<String>,
}

/// Wraps compiled SQL in its materialization.
pub struct Wrapper<'a> {
    env: &'a MacroEnvironment,
    adapter: Arc<dyn Adapter>,
}

impl<'a> Wrapper<'a> {
    pub fn new(env: &'a MacroEnvironment, adapter: Arc<dyn Adapter>) -> Self {
        Self { env, adapter }
    }

    /// Builtin strategies plus the adapter's, sorted.
    pub fn valid_strategies(&self) -> Vec<String> {
        let mut strategies: Vec<String> = BUILTIN_STRATEGIES
            .iter()
            .map(|s| s.to_string())
            .chain(self.adapter.custom_materializations())
            .collect();
        strategies.sort();
        strategies.dedup();
        strategies
    }

    /// Validate `node`'s config and derive the wrapping options.
    pub fn options(&self, node: &Node) -> CompileResult<WrapOptions> {
        let config = &node.config;
        let materialization = config.materialized.as_str();
        let valid = self.valid_strategies();
        if !valid.iter().any(|s| s == materialization) {
            return Err(CompileError::configuration(format!(
                "Invalid materialization '{materialization}'. Must be one of [{}]",
                valid.join(", ")
            )));
        }

        let flags = self.env.context().flags;
        let incremental = materialization == "incremental";
        let (sql_where, unique_key) = if incremental {
            let sql_where = config.sql_where.clone().ok_or_else(|| {
                CompileError::configuration(
                    "sql_where not specified in model materialized as incremental",
                )
            })?;
            (Some(sql_where), config.unique_key.clone())
        } else {
            (None, None)
        };

        let identifier = if incremental || flags.non_destructive {
            node.name.clone()
        } else {
            format!("{}{TMP_SUFFIX}", node.name)
        };

        let (dist, sort) = if incremental || materialization == "table" {
            (self.dist_qualifier(config)?, self.sort_qualifier(config)?)
        } else {
            (String::new(), String::new())
        };

        Ok(WrapOptions {
            materialization: materialization.to_string(),
            schema: config
                .schema
                .clone()
                .unwrap_or_else(|| self.env.context().target.schema.clone()),
            identifier,
            dist,
            sort,
            sql_where,
            unique_key,
            pre_hooks: config.pre_hook.clone(),
            post_hooks: config.post_hook.clone(),
        })
    }

    fn dist_qualifier(&self, config: &NodeConfig) -> CompileResult<String> {
        match &config.dist {
            None | Some(serde_json::Value::Null) => Ok(String::new()),
            Some(serde_json::Value::String(key)) => {
                Ok(self.adapter.dist_qualifier(&key.trim().to_lowercase())?)
            }
            Some(other) => Err(CompileError::configuration(format!(
                "The provided distkey '{other}' is not valid! dist must be a string"
            ))),
        }
    }

    fn sort_qualifier(&self, config: &NodeConfig) -> CompileResult<String> {
        let keys = match &config.sort {
            None | Some(serde_json::Value::Null) => return Ok(String::new()),
            Some(serde_json::Value::String(key)) => vec![key.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid_sort_key(&config.sort))?,
            Some(_) => return Err(invalid_sort_key(&config.sort)),
        };
        let sort_type = match &config.sort_type {
            None | Some(serde_json::Value::Null) => DEFAULT_SORT_TYPE.to_string(),
            Some(serde_json::Value::String(t)) => t.trim().to_lowercase(),
            Some(other) => {
                return Err(CompileError::configuration(format!(
                    "The provided sort_type '{other}' is not valid!"
                )))
            }
        };
        Ok(self.adapter.sort_qualifier(&sort_type, &keys)?)
    }

    /// Wrap `sql`, the node's injected SQL, in its materialization.
    ///
    /// `extra` holds the per-node render values (`ref`, `this`, ...) and is
    /// visible both to the materialization macro and to the final render.
    pub fn wrap(
        &self,
        node: &Node,
        sql: &str,
        namespace: &MacroNamespace,
        extra: BTreeMap<String, Value>,
    ) -> CompileResult<String> {
        let node_id = node.unique_id.to_string();
        self.wrap_inner(node, sql, namespace, extra, &node_id)
            .map_err(|e| e.with_node(&node_id))
    }

    fn wrap_inner(
        &self,
        node: &Node,
        sql: &str,
        namespace: &MacroNamespace,
        extra: BTreeMap<String, Value>,
        node_id: &str,
    ) -> CompileResult<String> {
        let options = self.options(node)?;
        let adapter_type = self.adapter.adapter_type();
        let materialization = namespace
            .materialization(&options.materialization, adapter_type)
            .ok_or_else(|| {
                CompileError::configuration(format!(
                    "No materialization '{}' was found for adapter '{adapter_type}'",
                    options.materialization
                ))
            })?;
        log::debug!(
            "Wrapping {node_id} with {} ({})",
            materialization.unique_id,
            materialization.path
        );

        let flags = self.env.context().flags;
        let mut available: BTreeMap<&str, Value> = BTreeMap::new();
        available.insert("materialization", Value::from(options.materialization.as_str()));
        available.insert("model", Value::from_serialize(node));
        available.insert("schema", Value::from(options.schema.as_str()));
        available.insert("identifier", Value::from(options.identifier.as_str()));
        available.insert("dist", Value::from(options.dist.as_str()));
        available.insert("sort", Value::from(options.sort.as_str()));
        available.insert("sql_where", Value::from(options.sql_where.clone()));
        available.insert("unique_key", Value::from(options.unique_key.clone()));
        available.insert("pre_hooks", Value::from(options.pre_hooks.clone()));
        available.insert("post_hooks", Value::from(options.post_hooks.clone()));
        available.insert("non_destructive", Value::from(flags.non_destructive));
        available.insert("sql", Value::from(sql));
        available.insert("flags", Value::from_serialize(flags));
        available.insert(
            "funcs",
            Value::from_object(AdapterFuncs::new(Arc::clone(&self.adapter))),
        );

        let relevant: Kwargs = materialization
            .arguments
            .iter()
            .filter_map(|arg| {
                available
                    .get(arg.as_str())
                    .map(|value| (arg.as_str(), value.clone()))
            })
            .collect();
        let rendered = self.env.call_macro(
            materialization,
            &[Value::from(relevant)],
            namespace,
            extra.clone(),
            Some(node_id),
        )?;

        let wrap = namespace
            .get("wrap", None)
            .ok_or_else(|| CompileError::internal("the wrap macro is not loaded"))?;
        let wrapped = self.env.call_macro(
            wrap,
            &[
                rendered,
                Value::from(options.pre_hooks),
                Value::from(options.post_hooks),
            ],
            namespace,
            extra.clone(),
            Some(node_id),
        )?;

        let mut values = extra;
        values.insert(
            "non_destructive".to_string(),
            Value::from(flags.non_destructive),
        );
        values.insert("full_refresh".to_string(), Value::from(flags.full_refresh));
        values.insert("flags".to_string(), Value::from_serialize(flags));
        self.env
            .render(&wrapped.to_string(), namespace, values, Some(node_id))
    }
}

fn invalid_sort_key(sort: &Option<serde_json::Value>) -> CompileError {
    let shown = sort
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    CompileError::configuration(format!(
        "The provided sort key '{shown}' is not valid! sort must be a string or a list of strings"
    ))
}

#[cfg(test)]
#[path = "wrapper_test.rs"]
mod tests;
