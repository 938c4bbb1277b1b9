//! Adapter callbacks consumed while wrapping
//!
//! The compiler never talks to a warehouse. Whatever it needs to know about
//! existing relations, and every dialect-specific qualifier it emits, comes
//! through the [`Adapter`] trait.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use ff_core::sql_utils::{quote_ident, quote_ident_list};
use ff_jinja::CompileError;
use minijinja::value::{from_args, Object, ObjectRepr};
use minijinja::{Error, ErrorKind, State, Value};

use crate::error::{AdapterError, AdapterResult};

/// Warehouse callbacks used by materializations.
///
/// Implementations must be Send + Sync; one adapter is shared by every node
/// of a compilation run.
pub trait Adapter: Send + Sync {
    /// Adapter type used to pick materialization overrides (`postgres`, ...)
    fn adapter_type(&self) -> &str;

    /// Check if a table or view exists
    fn table_exists(&self, schema: &str, identifier: &str) -> AdapterResult<bool>;

    /// Column names of an existing relation, in table order
    fn get_columns_in_table(&self, schema: &str, table: &str) -> AdapterResult<Vec<String>>;

    /// Columns present in the `from` relation but absent from `to`
    fn get_missing_columns(
        &self,
        from_schema: &str,
        from_table: &str,
        to_schema: &str,
        to_table: &str,
    ) -> AdapterResult<Vec<String>> {
        let existing = self.get_columns_in_table(to_schema, to_table)?;
        Ok(self
            .get_columns_in_table(from_schema, from_table)?
            .into_iter()
            .filter(|col| !existing.iter().any(|e| e.eq_ignore_ascii_case(col)))
            .collect())
    }

    /// Sort clause for `keys`; `sort_type` arrives trimmed and lowercased
    fn sort_qualifier(&self, sort_type: &str, keys: &[String]) -> AdapterResult<String>;

    /// Distribution clause for `key`; arrives trimmed and lowercased
    fn dist_qualifier(&self, key: &str) -> AdapterResult<String>;

    /// Strategies this adapter adds to `view`, `table` and `incremental`
    fn custom_materializations(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Adapter backed by an in-memory catalog of tables.
///
/// Qualifier syntax follows the adapter type: Redshift emits `diststyle` and
/// `sortkey` clauses, Snowflake emits `cluster by`, everything else emits
/// nothing.
#[derive(Debug, Default)]
pub struct CatalogAdapter {
    adapter_type: String,
    tables: RwLock<BTreeMap<(String, String), Vec<String>>>,
    custom_materializations: Vec<String>,
}

impl CatalogAdapter {
    pub fn new(adapter_type: impl Into<String>) -> Self {
        Self {
            adapter_type: adapter_type.into().to_ascii_lowercase(),
            tables: RwLock::new(BTreeMap::new()),
            custom_materializations: Vec::new(),
        }
    }

    /// Builder-style table registration
    pub fn with_table<S: Into<String>>(
        self,
        schema: &str,
        table: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> AdapterResult<Self> {
        self.add_table(schema, table, columns)?;
        Ok(self)
    }

    /// Register an extra materialization strategy
    pub fn with_custom_materialization(mut self, name: impl Into<String>) -> Self {
        self.custom_materializations.push(name.into());
        self
    }

    /// Register or replace a table in the catalog.
    pub fn add_table<S: Into<String>>(
        &self,
        schema: &str,
        table: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> AdapterResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| AdapterError::MutexPoisoned(e.to_string()))?;
        tables.insert(
            catalog_key(schema, table),
            columns.into_iter().map(Into::into).collect(),
        );
        Ok(())
    }
}

fn catalog_key(schema: &str, table: &str) -> (String, String) {
    (schema.to_ascii_lowercase(), table.to_ascii_lowercase())
}

impl Adapter for CatalogAdapter {
    fn adapter_type(&self) -> &str {
        &self.adapter_type
    }

    fn table_exists(&self, schema: &str, identifier: &str) -> AdapterResult<bool> {
        let tables = self
            .tables
            .read()
            .map_err(|e| AdapterError::MutexPoisoned(e.to_string()))?;
        Ok(tables.contains_key(&catalog_key(schema, identifier)))
    }

    fn get_columns_in_table(&self, schema: &str, table: &str) -> AdapterResult<Vec<String>> {
        let tables = self
            .tables
            .read()
            .map_err(|e| AdapterError::MutexPoisoned(e.to_string()))?;
        tables
            .get(&catalog_key(schema, table))
            .cloned()
            .ok_or_else(|| AdapterError::RelationNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            })
    }

    fn sort_qualifier(&self, sort_type: &str, keys: &[String]) -> AdapterResult<String> {
        if keys.is_empty() {
            return Ok(String::new());
        }
        match self.adapter_type.as_str() {
            "redshift" => match sort_type {
                "compound" | "interleaved" => {
                    Ok(format!("{sort_type} sortkey({})", quote_ident_list(keys)))
                }
                other => Err(AdapterError::InvalidArgument {
                    what: "sort_type".to_string(),
                    message: format!(
                        "'{other}' is not valid, expected one of [compound, interleaved]"
                    ),
                }),
            },
            "snowflake" => Ok(format!("cluster by ({})", quote_ident_list(keys))),
            _ => Ok(String::new()),
        }
    }

    fn dist_qualifier(&self, key: &str) -> AdapterResult<String> {
        match self.adapter_type.as_str() {
            "redshift" => match key {
                "" => Ok(String::new()),
                "all" | "even" => Ok(format!("diststyle {key}")),
                column => Ok(format!("diststyle key distkey({})", quote_ident(column))),
            },
            _ => Ok(String::new()),
        }
    }

    fn custom_materializations(&self) -> Vec<String> {
        self.custom_materializations.clone()
    }
}

/// Exposes adapter callbacks to materialization macros as `funcs`.
///
/// `funcs.already_exists(schema, identifier)`,
/// `funcs.get_columns_in_table(schema, table)` and
/// `funcs.get_missing_columns(from_schema, from_table, to_schema, to_table)`.
#[derive(Clone)]
pub struct AdapterFuncs {
    adapter: Arc<dyn Adapter>,
}

impl AdapterFuncs {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }
}

impl std::fmt::Debug for AdapterFuncs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterFuncs")
            .field("adapter_type", &self.adapter.adapter_type())
            .finish()
    }
}

impl Object for AdapterFuncs {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let result = match method {
            "already_exists" => {
                let (schema, identifier): (&str, &str) = from_args(args)?;
                self.adapter.table_exists(schema, identifier).map(Value::from)
            }
            "get_columns_in_table" => {
                let (schema, table): (&str, &str) = from_args(args)?;
                self.adapter
                    .get_columns_in_table(schema, table)
                    .map(Value::from)
            }
            "get_missing_columns" => {
                let (from_schema, from_table, to_schema, to_table): (&str, &str, &str, &str) =
                    from_args(args)?;
                self.adapter
                    .get_missing_columns(from_schema, from_table, to_schema, to_table)
                    .map(Value::from)
            }
            other => {
                return Err(Error::new(
                    ErrorKind::UnknownMethod,
                    format!("adapter has no method '{other}'"),
                ))
            }
        };
        result.map_err(|e| CompileError::runtime(e.to_string()).into_template_error())
    }
}

#[cfg(test)]
#[path = "adapter_test.rs"]
mod tests;
