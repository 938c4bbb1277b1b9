//! Command implementations

pub mod compile;
pub mod parse;
