//! Error types for ff-core

use thiserror::Error;

/// Core error type for Featherflow
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Unique id does not have the `type.package.name` shape
    #[error("[E001] unique_id {unique_id} is malformed")]
    MalformedUniqueId { unique_id: String },

    /// E002: Node name segment violates the naming rule of its resource type
    #[error("[E002] Invalid node name in '{unique_id}': {reason}")]
    InvalidNodeName { unique_id: String, reason: String },

    /// E003: Unknown resource type prefix
    #[error("[E003] Unknown resource type '{resource_type}'")]
    UnknownResourceType { resource_type: String },

    /// E004: Configuration file not found
    #[error("[E004] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E005: Failed to parse configuration
    #[error("[E005] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E006: Invalid configuration value
    #[error("[E006] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E007: `--vars` was valid YAML but not a mapping
    #[error("[E007] The --vars argument must be a YAML dictionary, but was of type '{type_name}'")]
    InvalidVars { type_name: String },

    /// E008: IO error with file path context
    #[error("[E008] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E009: YAML parse error
    #[error("[E009] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
