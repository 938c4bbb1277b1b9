//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Featherflow - compile templated SQL models into executable statements
#[derive(Parser, Debug)]
#[command(name = "ff")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the calls a template makes, without rendering it
    Parse(ParseArgs),

    /// Compile models to wrapped SQL
    Compile(CompileArgs),
}

/// Arguments for the parse command
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Template file to inspect
    pub file: String,

    /// Unique id to attribute errors to
    #[arg(long)]
    pub node: Option<String>,
}

/// Arguments for the compile command
#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Model files, dependencies before dependents
    #[arg(required = true)]
    pub models: Vec<String>,

    /// Source tables referenced by the models (`source_name.table_name`)
    #[arg(short, long)]
    pub source: Vec<String>,

    /// Override/add variables as YAML
    #[arg(long)]
    pub vars: Option<String>,

    /// Rebuild incremental models from scratch
    #[arg(long)]
    pub full_refresh: bool,

    /// Build in place instead of through a temporary relation
    #[arg(long)]
    pub non_destructive: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "sql")]
    pub output: CompileOutput,
}

/// Compile output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutput {
    /// Final SQL per model
    Sql,
    /// Compilation record per model
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
