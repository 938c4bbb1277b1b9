//! ff-core - Core library for Featherflow
//!
//! Shared node model, unique-id validation, node and project configuration,
//! and compile flags used by the templating and compilation crates.

pub mod config;
pub mod error;
pub mod manifest;
pub mod node;
pub(crate) mod serde_helpers;
pub mod sql_utils;

pub use config::{parse_cli_vars, CompileFlags, NodeConfig, ProjectConfig, TargetConfig};
pub use error::{CoreError, CoreResult};
pub use manifest::Manifest;
pub use node::{
    ephemeral_cte_name, id_matches, CompiledArtifact, CteFragment, Node, NodeType, UniqueId,
};
