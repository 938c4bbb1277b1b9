//! ff-sql - SQL layer for Featherflow
//!
//! Dialect selection by adapter type, sqlparser-backed tokenizing, and
//! injection of ephemeral-model CTEs into compiled statements.

pub mod dialect;
pub mod error;
pub mod inject;

pub use dialect::{
    dialect_for_adapter, DuckDbDialect, GenericDialect, PostgresDialect, RedshiftDialect,
    SnowflakeDialect, SqlDialect,
};
pub use error::{SqlError, SqlResult};
pub use inject::{collect_ephemeral_fragments, inject_ctes};
