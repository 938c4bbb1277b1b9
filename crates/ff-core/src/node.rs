//! Parsed and compiled graph nodes.
//!
//! A [`Node`] is the unit the compiler works on: a templated SQL body plus
//! the fields filled in as it moves through rendering, CTE injection and
//! materialization wrapping.

use crate::config::NodeConfig;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Prefix applied to ephemeral models when they are inlined as CTEs.
pub const EPHEMERAL_CTE_PREFIX: &str = "__ff__CTE__";

/// Resource type segment of a unique id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// SQL transformation model
    Model,
    /// Analysis (compiled, never materialized)
    Analysis,
    /// Data test
    Test,
    /// CSV seed
    Seed,
    /// Run-operation / hook body
    Operation,
    /// External source table
    Source,
    /// Macro definition
    Macro,
    /// Documentation block
    Docs,
}

impl NodeType {
    /// The lowercase segment used inside unique ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Model => "model",
            NodeType::Analysis => "analysis",
            NodeType::Test => "test",
            NodeType::Seed => "seed",
            NodeType::Operation => "operation",
            NodeType::Source => "source",
            NodeType::Macro => "macro",
            NodeType::Docs => "docs",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "model" => Ok(NodeType::Model),
            "analysis" => Ok(NodeType::Analysis),
            "test" => Ok(NodeType::Test),
            "seed" => Ok(NodeType::Seed),
            "operation" => Ok(NodeType::Operation),
            "source" => Ok(NodeType::Source),
            "macro" => Ok(NodeType::Macro),
            "docs" => Ok(NodeType::Docs),
            other => Err(CoreError::UnknownResourceType {
                resource_type: other.to_string(),
            }),
        }
    }
}

/// Validated `resource_type.package.name` identifier.
///
/// Sources carry a two-part name (`source.pkg.source_name.table_name`), every
/// other resource type a single-segment name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UniqueId {
    resource_type: NodeType,
    package: String,
    name: String,
}

impl UniqueId {
    /// Build an id from its parts, applying the same validation as [`UniqueId::parse`].
    pub fn new(
        resource_type: NodeType,
        package: impl Into<String>,
        name: impl Into<String>,
    ) -> CoreResult<Self> {
        let id = Self {
            resource_type,
            package: package.into(),
            name: name.into(),
        };
        id.validate()?;
        Ok(id)
    }

    /// Parse and validate a unique id string.
    pub fn parse(unique_id: &str) -> CoreResult<Self> {
        let parts: Vec<&str> = unique_id.splitn(3, '.').collect();
        let [resource_type, package, name] = parts.as_slice() else {
            return Err(CoreError::MalformedUniqueId {
                unique_id: unique_id.to_string(),
            });
        };
        if package.is_empty() || name.is_empty() {
            return Err(CoreError::MalformedUniqueId {
                unique_id: unique_id.to_string(),
            });
        }
        Self::new(resource_type.parse()?, *package, *name)
    }

    fn validate(&self) -> CoreResult<()> {
        let dots = self.name.matches('.').count();
        let reason = match self.resource_type {
            NodeType::Source if dots != 1 => "source names must contain exactly 1 '.' character",
            NodeType::Source => return Ok(()),
            _ if dots != 0 => "names cannot contain '.' characters",
            _ => return Ok(()),
        };
        Err(CoreError::InvalidNodeName {
            unique_id: self.to_string(),
            reason: format!("{} {}", self.resource_type, reason),
        })
    }

    /// Resource type segment
    pub fn resource_type(&self) -> NodeType {
        self.resource_type
    }

    /// Package segment
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Name segment (`source_name.table_name` for sources)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this id names `target_name` among `node_types`, optionally
    /// restricted to one package.
    pub fn matches(
        &self,
        target_name: &str,
        target_package: Option<&str>,
        node_types: &[NodeType],
    ) -> bool {
        node_types.contains(&self.resource_type)
            && self.name == target_name
            && target_package.is_none_or(|pkg| pkg == self.package)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.resource_type, self.package, self.name)
    }
}

impl TryFrom<String> for UniqueId {
    type Error = CoreError;

    fn try_from(s: String) -> CoreResult<Self> {
        Self::parse(&s)
    }
}

impl From<UniqueId> for String {
    fn from(id: UniqueId) -> Self {
        id.to_string()
    }
}

/// Return true if `unique_id` names `target_name` among `node_types`.
///
/// A `None` package matches any package. Malformed ids are an error rather
/// than a silent mismatch.
pub fn id_matches(
    unique_id: &str,
    target_name: &str,
    target_package: Option<&str>,
    node_types: &[NodeType],
) -> CoreResult<bool> {
    let id = UniqueId::parse(unique_id)?;
    Ok(id.matches(target_name, target_package, node_types))
}

/// CTE name used when an ephemeral model is inlined into a dependent.
pub fn ephemeral_cte_name(model_name: &str) -> String {
    format!("{EPHEMERAL_CTE_PREFIX}{model_name}")
}

/// One CTE to be injected into a node's compiled SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CteFragment {
    /// Unique id of the inlined dependency
    pub id: String,
    /// `name as (select ...)` text of the CTE
    pub sql: String,
}

impl CteFragment {
    /// Create a fragment
    pub fn new(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
        }
    }
}

/// The compilation record persisted for each node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    pub checksum: String,
    pub compiled: bool,
    pub compiled_sql: Option<String>,
    pub extra_ctes_injected: bool,
    pub extra_ctes: Vec<CteFragment>,
    pub injected_sql: Option<String>,
    pub wrapped_sql: Option<String>,
}

/// A parsed node and its compilation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub unique_id: UniqueId,
    pub name: String,
    pub package_name: String,
    pub resource_type: NodeType,
    #[serde(default)]
    pub original_file_path: String,
    pub raw_sql: String,
    #[serde(default)]
    pub config: NodeConfig,
    /// Unique ids this node referenced during its last render
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// True once every compilation step for this node has succeeded
    #[serde(default)]
    pub compiled: bool,
    /// Rendered SQL before CTE injection
    #[serde(default)]
    pub compiled_sql: Option<String>,
    #[serde(default)]
    pub extra_ctes: Vec<CteFragment>,
    /// SQL after CTE injection; present exactly when the CTEs are merged in
    #[serde(default)]
    injected_sql: Option<String>,
    #[serde(default)]
    pub wrapped_sql: Option<String>,
}

impl Node {
    /// Create a node of any resource type.
    pub fn new(
        resource_type: NodeType,
        package_name: impl Into<String>,
        name: impl Into<String>,
        raw_sql: impl Into<String>,
    ) -> CoreResult<Self> {
        let package_name = package_name.into();
        let name = name.into();
        let unique_id = UniqueId::new(resource_type, package_name.clone(), name.clone())?;
        Ok(Self {
            unique_id,
            name,
            package_name,
            resource_type,
            original_file_path: String::new(),
            raw_sql: raw_sql.into(),
            config: NodeConfig::default(),
            depends_on: Vec::new(),
            compiled: false,
            compiled_sql: None,
            extra_ctes: Vec::new(),
            injected_sql: None,
            wrapped_sql: None,
        })
    }

    /// Create a model node.
    pub fn model(
        package_name: impl Into<String>,
        name: impl Into<String>,
        raw_sql: impl Into<String>,
    ) -> CoreResult<Self> {
        Self::new(NodeType::Model, package_name, name, raw_sql)
    }

    /// Create a source node named `source_name.table_name`.
    pub fn source(
        package_name: impl Into<String>,
        source_name: &str,
        table_name: &str,
    ) -> CoreResult<Self> {
        Self::new(
            NodeType::Source,
            package_name,
            format!("{source_name}.{table_name}"),
            "",
        )
    }

    /// Insert or replace a CTE fragment by id.
    ///
    /// An existing fragment keeps its position and takes the new SQL; an
    /// unknown id is appended.
    pub fn set_cte(&mut self, cte_id: &str, sql: impl Into<String>) {
        let sql = sql.into();
        match self.extra_ctes.iter_mut().find(|cte| cte.id == cte_id) {
            Some(cte) => cte.sql = sql,
            None => self.extra_ctes.push(CteFragment::new(cte_id, sql)),
        }
    }

    /// Record the SQL produced by merging `extra_ctes` into `compiled_sql`.
    pub fn set_injected_sql(&mut self, injected_sql: String) {
        self.injected_sql = Some(injected_sql);
    }

    /// Whether the extra CTEs have been merged in
    pub fn extra_ctes_injected(&self) -> bool {
        self.injected_sql.is_some()
    }

    /// SQL after CTE injection
    pub fn injected_sql(&self) -> Option<&str> {
        self.injected_sql.as_deref()
    }

    /// Whether this node is inlined into dependents rather than persisted
    pub fn is_ephemeral(&self) -> bool {
        self.config.is_ephemeral()
    }

    /// SHA-256 of the raw template source, for change detection.
    pub fn checksum(&self) -> String {
        format!("{:x}", Sha256::digest(self.raw_sql.as_bytes()))
    }

    /// Snapshot of the compilation fields.
    pub fn artifact(&self) -> CompiledArtifact {
        CompiledArtifact {
            checksum: self.checksum(),
            compiled: self.compiled,
            compiled_sql: self.compiled_sql.clone(),
            extra_ctes_injected: self.extra_ctes_injected(),
            extra_ctes: self.extra_ctes.clone(),
            injected_sql: self.injected_sql.clone(),
            wrapped_sql: self.wrapped_sql.clone(),
        }
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod tests;
