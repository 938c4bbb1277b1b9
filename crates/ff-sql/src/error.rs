//! Error types for ff-sql

use thiserror::Error;

/// SQL tokenizing and CTE injection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlError {
    /// An ephemeral dependency has no compiled SQL to inline (S001)
    #[error("[S001] Ephemeral dependency '{0}' has not been compiled")]
    UncompiledDependency(String),

    /// SQL could not be split into tokens (S002)
    #[error("[S002] SQL tokenize error at line {line}, column {column}: {message}")]
    TokenizeError {
        message: String,
        line: usize,
        column: usize,
    },

    /// No dialect registered for an adapter type (S003)
    #[error("[S003] Unsupported SQL dialect '{0}'")]
    UnsupportedDialect(String),
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
