//! Error types for ff-compile

use ff_jinja::CompileError;
use thiserror::Error;

/// Adapter callback errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Relation not found (A001)
    #[error("[A001] Relation not found: {schema}.{table}")]
    RelationNotFound { schema: String, table: String },

    /// Feature not supported by this adapter (A002)
    #[error("[A002] Feature not supported for {adapter}: {feature}")]
    NotSupported { adapter: String, feature: String },

    /// Invalid qualifier argument (A003)
    #[error("[A003] Invalid {what}: {message}")]
    InvalidArgument { what: String, message: String },

    /// Catalog mutex poisoned (A004)
    #[error("[A004] Catalog mutex poisoned: {0}")]
    MutexPoisoned(String),
}

/// Result type alias for AdapterError
pub type AdapterResult<T> = Result<T, AdapterError>;

impl From<AdapterError> for CompileError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::InvalidArgument { .. } | AdapterError::NotSupported { .. } => {
                CompileError::configuration(err.to_string())
            }
            _ => CompileError::runtime(err.to_string()),
        }
    }
}
