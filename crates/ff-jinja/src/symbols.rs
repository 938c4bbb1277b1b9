//! Reserved internal names for macro, materialization and docs definitions.
//!
//! Every definition is registered under a synthetic identifier that user
//! code cannot spell by accident. The table keeps the two tiers apart: a
//! source-visible name may not already use a reserved prefix, and two
//! different definitions may never share an internal identifier.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::{CompileError, CompileResult};

/// Prefix of every internal macro and materialization identifier
pub const MACRO_PREFIX: &str = "__macro__";

/// Prefix of every internal docs-block identifier
pub const DOCS_PREFIX: &str = "__docs__";

/// Adapter name used by adapter-agnostic materializations
pub const DEFAULT_ADAPTER: &str = "default";

/// What a definition is, in source terms
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolKey {
    Macro { name: String },
    Materialization { name: String, adapter: String },
    Docs { name: String },
}

impl SymbolKey {
    pub fn macro_named(name: impl Into<String>) -> Self {
        SymbolKey::Macro { name: name.into() }
    }

    /// Materialization for `adapter`, or the default implementation.
    pub fn materialization(name: impl Into<String>, adapter: Option<&str>) -> Self {
        SymbolKey::Materialization {
            name: name.into(),
            adapter: adapter.unwrap_or(DEFAULT_ADAPTER).to_string(),
        }
    }

    pub fn docs(name: impl Into<String>) -> Self {
        SymbolKey::Docs { name: name.into() }
    }

    /// The name callers use: the macro name, `materialization_<m>_<adapter>`,
    /// or the docs block name.
    pub fn source_name(&self) -> String {
        match self {
            SymbolKey::Macro { name } | SymbolKey::Docs { name } => name.clone(),
            SymbolKey::Materialization { name, adapter } => {
                materialization_macro_name(name, Some(adapter))
            }
        }
    }

    /// The identifier the definition is registered under in templates.
    pub fn internal_name(&self) -> String {
        match self {
            SymbolKey::Docs { name } => format!("{DOCS_PREFIX}{name}"),
            _ => format!("{MACRO_PREFIX}{}", self.source_name()),
        }
    }

    pub fn is_docs(&self) -> bool {
        matches!(self, SymbolKey::Docs { .. })
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKey::Macro { name } => write!(f, "macro '{name}'"),
            SymbolKey::Materialization { name, adapter } => {
                write!(f, "materialization '{name}' for adapter '{adapter}'")
            }
            SymbolKey::Docs { name } => write!(f, "docs block '{name}'"),
        }
    }
}

/// `materialization_<strategy>_<adapter or default>`
pub fn materialization_macro_name(strategy: &str, adapter: Option<&str>) -> String {
    format!(
        "materialization_{}_{}",
        strategy,
        adapter.unwrap_or(DEFAULT_ADAPTER)
    )
}

/// Whether `name` starts with a reserved internal prefix
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(MACRO_PREFIX) || name.starts_with(DOCS_PREFIX)
}

/// Definitions registered so far, keyed both ways to catch collisions
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    by_key: HashMap<SymbolKey, String>,
    by_internal: HashMap<String, SymbolKey>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` and return its internal identifier.
    ///
    /// Registering the same key again returns the same identifier.
    pub fn intern(&mut self, key: SymbolKey) -> CompileResult<String> {
        if let Some(internal) = self.by_key.get(&key) {
            return Ok(internal.clone());
        }
        let source_name = match &key {
            SymbolKey::Macro { name } | SymbolKey::Docs { name } => name.as_str(),
            SymbolKey::Materialization { name, adapter } => {
                if is_reserved(adapter) {
                    return Err(reserved(&key, adapter));
                }
                name.as_str()
            }
        };
        if is_reserved(source_name) {
            return Err(reserved(&key, source_name));
        }

        let internal = key.internal_name();
        if let Some(existing) = self.by_internal.get(&internal) {
            return Err(CompileError::syntax(format!(
                "{key} collides with {existing}: both would be registered as '{internal}'"
            )));
        }
        self.by_internal.insert(internal.clone(), key.clone());
        self.by_key.insert(key, internal.clone());
        Ok(internal)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

fn reserved(key: &SymbolKey, name: &str) -> CompileError {
    CompileError::syntax(format!(
        "{key} uses the reserved name '{name}'; names may not start with '{MACRO_PREFIX}' or '{DOCS_PREFIX}'"
    ))
}
