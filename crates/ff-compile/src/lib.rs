//! ff-compile - compilation pipeline for Featherflow
//!
//! Adapter callbacks, materialization wrapping, and the per-node pipeline
//! that takes a model from raw template to wrapped, executable SQL.

pub mod adapter;
pub mod compiler;
pub mod error;
pub mod wrapper;

pub use adapter::{Adapter, AdapterFuncs, CatalogAdapter};
pub use compiler::NodeCompiler;
pub use error::{AdapterError, AdapterResult};
pub use wrapper::{WrapOptions, Wrapper, BUILTIN_STRATEGIES, TMP_SUFFIX};
