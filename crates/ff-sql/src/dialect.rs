//! SQL dialect abstraction

use sqlparser::dialect::{
    Dialect, DuckDbDialect as SqlParserDuckDb, GenericDialect as SqlParserGeneric,
    PostgreSqlDialect as SqlParserPostgres, RedshiftSqlDialect as SqlParserRedshift,
    SnowflakeDialect as SqlParserSnowflake,
};
use sqlparser::tokenizer::{TokenWithSpan, Tokenizer};

use crate::error::{SqlError, SqlResult};

/// Trait for SQL dialect implementations
pub trait SqlDialect: Send + Sync {
    /// Get the underlying sqlparser dialect
    fn parser_dialect(&self) -> &dyn Dialect;

    /// Split SQL into tokens, keeping whitespace and comments, with their
    /// 1-based line/column spans.
    fn tokenize(&self, sql: &str) -> SqlResult<Vec<TokenWithSpan>> {
        Tokenizer::new(self.parser_dialect(), sql)
            .tokenize_with_location()
            .map_err(|e| SqlError::TokenizeError {
                message: e.message.clone(),
                line: e.location.line as usize,
                column: e.location.column as usize,
            })
    }
}

macro_rules! define_dialect {
    (
        $(#[$meta:meta])*
        $Name:ident => $Inner:ident
    ) => {
        $(#[$meta])*
        pub struct $Name {
            dialect: $Inner,
        }

        impl $Name {
            pub fn new() -> Self {
                Self {
                    dialect: $Inner {},
                }
            }
        }

        impl Default for $Name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl SqlDialect for $Name {
            fn parser_dialect(&self) -> &dyn Dialect {
                &self.dialect
            }
        }
    };
}

define_dialect!(
    /// PostgreSQL dialect
    PostgresDialect => SqlParserPostgres
);

define_dialect!(
    /// Redshift dialect
    RedshiftDialect => SqlParserRedshift
);

define_dialect!(
    /// Snowflake SQL dialect
    SnowflakeDialect => SqlParserSnowflake
);

define_dialect!(
    /// DuckDB SQL dialect
    DuckDbDialect => SqlParserDuckDb
);

define_dialect!(
    /// Permissive fallback dialect
    GenericDialect => SqlParserGeneric
);

/// Dialect for an adapter type name (case-insensitive).
pub fn dialect_for_adapter(adapter_type: &str) -> SqlResult<Box<dyn SqlDialect>> {
    match adapter_type.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(Box::new(PostgresDialect::new())),
        "redshift" => Ok(Box::new(RedshiftDialect::new())),
        "snowflake" => Ok(Box::new(SnowflakeDialect::new())),
        "duckdb" => Ok(Box::new(DuckDbDialect::new())),
        "generic" | "default" => Ok(Box::new(GenericDialect::new())),
        other => Err(SqlError::UnsupportedDialect(other.to_string())),
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
