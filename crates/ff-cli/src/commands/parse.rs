//! Parse command implementation

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::{GlobalArgs, ParseArgs};

/// Print the call map of one template as JSON
pub fn execute(args: &ParseArgs, global: &GlobalArgs) -> Result<()> {
    let path = Path::new(&global.project_dir).join(&args.file);
    let source = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if global.verbose {
        eprintln!("[verbose] Extracting calls from {}", path.display());
    }

    let result = ff_jinja::extract(&source, args.node.as_deref())
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
