//! Featherflow CLI - compile templated SQL models into executable statements

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::Cli;
use commands::{compile, parse};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        cli::Commands::Parse(args) => parse::execute(args, &cli.global),
        cli::Commands::Compile(args) => compile::execute(args, &cli.global),
    }
}
