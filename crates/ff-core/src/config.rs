//! Configuration types: per-node config, compile flags and featherflow.yml

use crate::error::{CoreError, CoreResult};
use crate::serde_helpers::{default_true, one_or_many};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Materialization name used when a node does not configure one
pub const DEFAULT_MATERIALIZATION: &str = "view";

/// Materialization that inlines a node into its dependents
pub const EPHEMERAL: &str = "ephemeral";

/// Per-node configuration, from YAML properties or `config(...)` calls.
///
/// Values the wrapper type-checks itself (`dist`, `sort`, `sort_type`) are
/// kept as raw JSON so a bad shape is reported at wrap time as a
/// configuration error rather than rejected while parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Materialization strategy name (view, table, incremental, ephemeral, ...)
    #[serde(default = "default_materialized")]
    pub materialized: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Schema override for the persisted relation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub tags: Vec<String>,

    /// SQL run before the model's core statement
    #[serde(
        default,
        rename = "pre-hook",
        alias = "pre_hook",
        deserialize_with = "one_or_many"
    )]
    pub pre_hook: Vec<String>,

    /// SQL run after the model's core statement
    #[serde(
        default,
        rename = "post-hook",
        alias = "post_hook",
        deserialize_with = "one_or_many"
    )]
    pub post_hook: Vec<String>,

    /// Distribution key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<serde_json::Value>,

    /// Sort key, a column name or list of column names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<serde_json::Value>,

    /// Sort style (compound, interleaved)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_type: Option<serde_json::Value>,

    /// Incremental predicate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_where: Option<String>,

    /// Merge key for incremental models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,

    /// Any other keys, preserved for templates and adapter macros
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_materialized() -> String {
    DEFAULT_MATERIALIZATION.to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            materialized: default_materialized(),
            enabled: true,
            schema: None,
            tags: Vec::new(),
            pre_hook: Vec::new(),
            post_hook: Vec::new(),
            dist: None,
            sort: None,
            sort_type: None,
            sql_where: None,
            unique_key: None,
            extra: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    /// Whether the node is inlined as a CTE instead of persisted
    pub fn is_ephemeral(&self) -> bool {
        self.materialized == EPHEMERAL
    }

    /// Set one key, with the same parsing rules as deserialization.
    ///
    /// Known keys are validated (`materialized` must be a string, hooks a
    /// string or list); unknown keys land in `extra`.
    pub fn apply(&mut self, key: &str, value: serde_json::Value) -> CoreResult<()> {
        let mut map = match serde_json::to_value(&*self)? {
            serde_json::Value::Object(map) => map,
            _ => {
                return Err(CoreError::ConfigInvalid {
                    message: "node config did not serialize to a mapping".to_string(),
                })
            }
        };
        let key = match key {
            "pre_hook" => "pre-hook",
            "post_hook" => "post-hook",
            other => other,
        };
        map.insert(key.to_string(), value);
        *self = serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| {
            CoreError::ConfigInvalid {
                message: format!("invalid value for config key '{key}': {e}"),
            }
        })?;
        Ok(())
    }

    /// Apply every entry of a mapping in order.
    pub fn apply_all<I>(&mut self, entries: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        for (key, value) in entries {
            self.apply(&key, value)?;
        }
        Ok(())
    }
}

/// Run-wide switches read while compiling.
///
/// Passed explicitly into each compilation; there is no process-global copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFlags {
    /// Build in place instead of through a temporary relation
    #[serde(default)]
    pub non_destructive: bool,

    /// Rebuild incremental models from scratch
    #[serde(default)]
    pub full_refresh: bool,

    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Treat warnings as errors and enable extra checks
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub warn_error: bool,
}

impl Default for CompileFlags {
    fn default() -> Self {
        Self {
            non_destructive: false,
            full_refresh: false,
            use_cache: true,
            strict: false,
            warn_error: false,
        }
    }
}

impl CompileFlags {
    pub fn with_non_destructive(mut self, on: bool) -> Self {
        self.non_destructive = on;
        self
    }

    pub fn with_full_refresh(mut self, on: bool) -> Self {
        self.full_refresh = on;
        self
    }

    pub fn with_use_cache(mut self, on: bool) -> Self {
        self.use_cache = on;
        self
    }

    /// Strict mode also turns warnings into errors.
    pub fn with_strict(mut self, on: bool) -> Self {
        self.strict = on;
        self
    }

    pub fn with_warn_error(mut self, on: bool) -> Self {
        self.warn_error = on;
        self
    }

    /// Whether warnings should fail the run
    pub fn warnings_are_errors(&self) -> bool {
        self.strict || self.warn_error
    }
}

/// Warehouse target the project compiles for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target name (dev, prod, ...)
    #[serde(default = "default_target_name")]
    pub name: String,

    /// Default schema for persisted relations
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Adapter type used to pick materialization macros
    #[serde(default = "default_adapter_type", rename = "type", alias = "adapter_type")]
    pub adapter_type: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: default_target_name(),
            schema: default_schema(),
            adapter_type: default_adapter_type(),
        }
    }
}

fn default_target_name() -> String {
    "dev".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_adapter_type() -> String {
    "postgres".to_string()
}

/// Project configuration from featherflow.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project (root package) name
    pub name: String,

    /// Variables available through `var()`
    #[serde(default)]
    pub vars: HashMap<String, serde_yaml::Value>,

    #[serde(default)]
    pub target: TargetConfig,

    /// Directories containing macro files
    #[serde(default = "default_macro_paths")]
    pub macro_paths: Vec<String>,

    #[serde(default)]
    pub flags: CompileFlags,
}

fn default_macro_paths() -> Vec<String> {
    vec!["macros".to_string()]
}

impl ProjectConfig {
    /// Minimal configuration for a named project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: HashMap::new(),
            target: TargetConfig::default(),
            macro_paths: default_macro_paths(),
            flags: CompileFlags::default(),
        }
    }

    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: ProjectConfig =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                message: format!("{}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for featherflow.yml or featherflow.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("featherflow.yml");
        let yaml_path = dir.join("featherflow.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }
        if self.target.adapter_type.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "target.type cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Overlay `--vars` values on top of the project vars.
    pub fn merge_vars(&mut self, overrides: HashMap<String, serde_yaml::Value>) {
        self.vars.extend(overrides);
    }

    /// Get absolute macro paths relative to a project root
    pub fn macro_paths_absolute(&self, root: &Path) -> Vec<PathBuf> {
        self.macro_paths.iter().map(|p| root.join(p)).collect()
    }
}

/// Parse the YAML text given to `--vars`.
///
/// Blank input is an empty mapping; any other non-mapping value is an error
/// naming its YAML type.
pub fn parse_cli_vars(text: &str) -> CoreResult<HashMap<String, serde_yaml::Value>> {
    if text.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| CoreError::ConfigParseError {
            message: format!("--vars: {e}"),
        })?;
    let mapping = match value {
        serde_yaml::Value::Mapping(mapping) => mapping,
        other => {
            return Err(CoreError::InvalidVars {
                type_name: yaml_type_name(&other).to_string(),
            })
        }
    };
    mapping
        .into_iter()
        .map(|(key, value)| match key {
            serde_yaml::Value::String(key) => Ok((key, value)),
            other => Err(CoreError::ConfigInvalid {
                message: format!(
                    "--vars keys must be strings, found a {}",
                    yaml_type_name(&other)
                ),
            }),
        })
        .collect()
}

fn yaml_type_name(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "bool",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged",
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
