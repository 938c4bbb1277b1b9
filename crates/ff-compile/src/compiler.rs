//! Per-node compilation pipeline
//!
//! render → inject ephemeral CTEs → wrap. Every step runs on a scratch copy
//! of the node; the node is only updated once all of them succeed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use ff_core::node::{ephemeral_cte_name, CteFragment, Node, NodeType};
use ff_core::sql_utils::quote_ident;
use ff_core::Manifest;
use ff_jinja::{make_config_fn, CompileError, CompileResult, ConfigCapture, MacroEnvironment};
use ff_sql::{collect_ephemeral_fragments, dialect_for_adapter, inject_ctes, SqlDialect};
use minijinja::{Error, ErrorKind, Value};

use crate::adapter::Adapter;
use crate::wrapper::Wrapper;

/// Node types `ref()` resolves to
const REF_TYPES: [NodeType; 3] = [NodeType::Model, NodeType::Seed, NodeType::Analysis];

/// Compiles nodes against one macro environment and adapter.
pub struct NodeCompiler<'a> {
    env: &'a MacroEnvironment,
    adapter: Arc<dyn Adapter>,
    dialect: Box<dyn SqlDialect>,
}

impl<'a> NodeCompiler<'a> {
    /// Create a compiler; the SQL dialect follows the adapter type.
    pub fn new(env: &'a MacroEnvironment, adapter: Arc<dyn Adapter>) -> CompileResult<Self> {
        let dialect = dialect_for_adapter(adapter.adapter_type())
            .map_err(|e| CompileError::configuration(e.to_string()))?;
        Ok(Self {
            env,
            adapter,
            dialect,
        })
    }

    /// Compile `node`, resolving `ref()` and `source()` against `manifest`.
    ///
    /// Ephemeral dependencies must already be compiled in `manifest`. On
    /// failure `node` is left untouched.
    pub fn compile(&self, node: &mut Node, manifest: &Manifest) -> CompileResult<()> {
        let node_id = node.unique_id.to_string();
        let mut scratch = node.clone();
        scratch.compiled = false;
        self.run(&mut scratch, manifest, &node_id)
            .map_err(|e| e.with_node(&node_id))?;
        scratch.compiled = true;
        *node = scratch;
        log::debug!("Compiled {node_id}");
        Ok(())
    }

    /// Compile the nodes named by `order`, which must list dependencies
    /// before their dependents. Stops at the first failure.
    pub fn compile_all(&self, manifest: &mut Manifest, order: &[String]) -> CompileResult<()> {
        for id in order {
            let mut node = manifest
                .get(id)
                .cloned()
                .ok_or_else(|| CompileError::internal(format!("node {id} is not in the manifest")))?;
            if node.resource_type == NodeType::Source || !node.config.enabled {
                log::debug!("Skipping {id}");
                continue;
            }
            self.compile(&mut node, manifest)?;
            manifest.add_node(node);
        }
        Ok(())
    }

    fn run(&self, node: &mut Node, manifest: &Manifest, node_id: &str) -> CompileResult<()> {
        let namespace = self.env.namespace(&node.package_name);
        let relations = Arc::new(Relations::from_manifest(
            manifest,
            &self.env.context().target.schema,
        ));
        let refs: RefLog = Arc::new(Mutex::new(Vec::new()));
        let captured: ConfigCapture = Arc::default();
        let extra = self.render_values(node, &relations, &refs, &captured);

        let compiled_sql = self
            .env
            .render(&node.raw_sql, &namespace, extra.clone(), Some(node_id))?;

        let config = std::mem::take(&mut *lock(&captured)?);
        node.config
            .apply_all(config)
            .map_err(|e| CompileError::configuration(e.to_string()))?;
        node.depends_on = std::mem::take(&mut *lock(&refs)?);

        let fragments = self.ephemeral_fragments(node, manifest)?;
        node.extra_ctes
            .retain(|cte| fragments.iter().any(|f| f.id == cte.id));
        for fragment in fragments {
            node.set_cte(&fragment.id, fragment.sql);
        }
        let injected = inject_ctes(self.dialect.as_ref(), &compiled_sql, &node.extra_ctes)
            .map_err(|e| CompileError::internal(e.to_string()))?;
        node.compiled_sql = Some(compiled_sql);
        node.set_injected_sql(injected.clone());

        node.wrapped_sql = if node.is_ephemeral() {
            None
        } else {
            let wrapper = Wrapper::new(self.env, Arc::clone(&self.adapter));
            Some(wrapper.wrap(node, &injected, &namespace, extra)?)
        };
        Ok(())
    }

    /// `ref`, `source`, `config`, `this` and `model` for one node.
    fn render_values(
        &self,
        node: &Node,
        relations: &Arc<Relations>,
        refs: &RefLog,
        captured: &ConfigCapture,
    ) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();

        let (rels, log) = (Arc::clone(relations), Arc::clone(refs));
        let owner = node.unique_id.to_string();
        values.insert(
            "ref".to_string(),
            Value::from_function(move |first: &str, second: Option<&str>| {
                let (package, name) = match second {
                    Some(name) => (Some(first), name),
                    None => (None, first),
                };
                let relation = rels.find(name, package, &REF_TYPES).ok_or_else(|| {
                    CompileError::undefined(format!(
                        "Model '{owner}' depends on '{name}' which was not found"
                    ))
                    .into_template_error()
                })?;
                record(&log, &relation.unique_id)?;
                Ok::<_, Error>(relation.render())
            }),
        );

        let (rels, log) = (Arc::clone(relations), Arc::clone(refs));
        let owner = node.unique_id.to_string();
        values.insert(
            "source".to_string(),
            Value::from_function(move |source_name: &str, table_name: &str| {
                let name = format!("{source_name}.{table_name}");
                let relation = rels.find(&name, None, &[NodeType::Source]).ok_or_else(|| {
                    CompileError::undefined(format!(
                        "Model '{owner}' depends on source '{name}' which was not found"
                    ))
                    .into_template_error()
                })?;
                record(&log, &relation.unique_id)?;
                Ok::<_, Error>(relation.render())
            }),
        );

        values.insert(
            "config".to_string(),
            Value::from_function(make_config_fn(Arc::clone(captured))),
        );
        let schema = node
            .config
            .schema
            .clone()
            .unwrap_or_else(|| self.env.context().target.schema.clone());
        values.insert(
            "this".to_string(),
            Value::from(format!("{}.{}", quote_ident(&schema), quote_ident(&node.name))),
        );
        values.insert("model".to_string(), Value::from_serialize(&*node));
        values
    }

    /// Fragments for every ephemeral node `node` reaches through ephemeral
    /// nodes, innermost first. Each of them must already be compiled.
    fn ephemeral_fragments(
        &self,
        node: &Node,
        manifest: &Manifest,
    ) -> CompileResult<Vec<CteFragment>> {
        let node_id = node.unique_id.to_string();
        let mut deps: HashMap<String, Vec<String>> = manifest
            .nodes()
            .map(|n| (n.unique_id.to_string(), n.depends_on.clone()))
            .collect();
        deps.insert(node_id.clone(), node.depends_on.clone());

        collect_ephemeral_fragments(
            &node_id,
            &deps,
            |id| manifest.get(id).is_some_and(Node::is_ephemeral),
            |id| {
                let dep = manifest.get(id).filter(|dep| dep.compiled)?;
                let sql = dep.compiled_sql.as_deref()?;
                Some(CteFragment::new(
                    id,
                    format!("{} as (\n{}\n)", ephemeral_cte_name(&dep.name), sql.trim()),
                ))
            },
        )
        .map_err(|e| CompileError::internal(e.to_string()))
    }
}

type RefLog = Arc<Mutex<Vec<String>>>;

fn lock<T>(mutex: &Mutex<T>) -> CompileResult<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| CompileError::internal(format!("compile state mutex poisoned: {e}")))
}

fn record(log: &RefLog, unique_id: &str) -> Result<(), Error> {
    let mut log = log.lock().map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("dependency log poisoned: {e}"),
        )
    })?;
    if !log.iter().any(|id| id == unique_id) {
        log.push(unique_id.to_string());
    }
    Ok(())
}

/// Relation lookup for `ref()` and `source()`, detached from the manifest so
/// template functions can own it.
#[derive(Debug, Default)]
struct Relations {
    entries: Vec<Relation>,
}

#[derive(Debug)]
struct Relation {
    id: ff_core::UniqueId,
    unique_id: String,
    schema: String,
    table: String,
    ephemeral: bool,
}

impl Relation {
    fn render(&self) -> String {
        if self.ephemeral {
            ephemeral_cte_name(&self.table)
        } else {
            format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
        }
    }
}

impl Relations {
    fn from_manifest(manifest: &Manifest, default_schema: &str) -> Self {
        let entries = manifest
            .nodes()
            .map(|node| {
                let (schema, table) = match node.resource_type {
                    NodeType::Source => {
                        let (source, table) =
                            node.name.split_once('.').unwrap_or((node.name.as_str(), ""));
                        (node.config.schema.clone().unwrap_or_else(|| source.to_string()), table)
                    }
                    _ => (
                        node.config
                            .schema
                            .clone()
                            .unwrap_or_else(|| default_schema.to_string()),
                        node.name.as_str(),
                    ),
                };
                Relation {
                    id: node.unique_id.clone(),
                    unique_id: node.unique_id.to_string(),
                    schema,
                    table: table.to_string(),
                    ephemeral: node.is_ephemeral(),
                }
            })
            .collect();
        Self { entries }
    }

    fn find(&self, name: &str, package: Option<&str>, types: &[NodeType]) -> Option<&Relation> {
        self.entries
            .iter()
            .find(|rel| rel.id.matches(name, package, types))
    }
}

#[cfg(test)]
#[path = "compiler_test.rs"]
mod tests;
