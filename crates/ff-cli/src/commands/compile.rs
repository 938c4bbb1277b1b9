//! Compile command implementation

use anyhow::{bail, Context, Result};
use ff_compile::{CatalogAdapter, NodeCompiler};
use ff_core::config::{parse_cli_vars, ProjectConfig};
use ff_core::{Manifest, Node};
use ff_jinja::{MacroEnvironment, TemplateContext};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{CompileArgs, CompileOutput, GlobalArgs};

/// Execute the compile command
pub fn execute(args: &CompileArgs, global: &GlobalArgs) -> Result<()> {
    let project_dir = Path::new(&global.project_dir);
    let mut project = load_project(project_dir, global.config.as_deref())?;

    if let Some(vars) = &args.vars {
        project.merge_vars(parse_cli_vars(vars).context("Invalid --vars")?);
    }
    project.flags = project
        .flags
        .with_full_refresh(project.flags.full_refresh || args.full_refresh)
        .with_non_destructive(project.flags.non_destructive || args.non_destructive);

    let env = build_environment(&project, project_dir, global.verbose)?;
    let (mut manifest, order) = build_manifest(&project, project_dir, args)?;

    if global.verbose {
        eprintln!(
            "[verbose] Compiling {} models for target '{}' ({})",
            order.len(),
            project.target.name,
            project.target.adapter_type
        );
    }

    let adapter = Arc::new(CatalogAdapter::new(project.target.adapter_type.clone()));
    let compiler = NodeCompiler::new(&env, adapter).context("Failed to create compiler")?;
    compiler
        .compile_all(&mut manifest, &order)
        .context("Compilation failed")?;

    match args.output {
        CompileOutput::Sql => {
            for id in &order {
                let Some(node) = manifest.get(id) else {
                    continue;
                };
                let sql = node
                    .wrapped_sql
                    .as_deref()
                    .or(node.injected_sql())
                    .unwrap_or_default();
                println!("-- {id}\n{sql}\n");
            }
        }
        CompileOutput::Json => {
            let artifacts: BTreeMap<_, _> = manifest
                .artifacts()
                .into_iter()
                .filter(|(id, _)| order.contains(id))
                .collect();
            println!("{}", serde_json::to_string_pretty(&artifacts)?);
        }
    }
    Ok(())
}

fn load_project(project_dir: &Path, config: Option<&str>) -> Result<ProjectConfig> {
    let project = match config {
        Some(path) => ProjectConfig::load(Path::new(path)),
        None => ProjectConfig::load_from_dir(project_dir),
    };
    project.context("Failed to load project config")
}

fn build_environment(
    project: &ProjectConfig,
    project_dir: &Path,
    verbose: bool,
) -> Result<MacroEnvironment> {
    let mut builder = MacroEnvironment::builder(TemplateContext::from_project(project))
        .with_global_project()
        .context("Failed to load builtin macros")?;
    for dir in project.macro_paths_absolute(project_dir) {
        if !dir.is_dir() {
            if verbose {
                eprintln!("[verbose] Skipping missing macro path {}", dir.display());
            }
            continue;
        }
        if verbose {
            eprintln!("[verbose] Loading macros from {}", dir.display());
        }
        builder = builder
            .add_macro_dir(&project.name, &dir)
            .with_context(|| format!("Failed to load macros from {}", dir.display()))?;
    }
    builder.build().context("Failed to build macro environment")
}

/// Models in command-line order, plus the declared sources.
fn build_manifest(
    project: &ProjectConfig,
    project_dir: &Path,
    args: &CompileArgs,
) -> Result<(Manifest, Vec<String>)> {
    let mut manifest = Manifest::new(project.name.clone());

    for source in &args.source {
        let Some((source_name, table_name)) = source.split_once('.') else {
            bail!("Invalid --source '{source}', expected source_name.table_name");
        };
        let node = Node::source(project.name.clone(), source_name, table_name)
            .with_context(|| format!("Invalid --source '{source}'"))?;
        manifest.add_node(node);
    }

    let mut order = Vec::with_capacity(args.models.len());
    for model in &args.models {
        let path: PathBuf = project_dir.join(model);
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Invalid model path {}", path.display()))?;
        let raw_sql = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut node = Node::model(project.name.clone(), name, raw_sql)
            .with_context(|| format!("Invalid model name '{name}'"))?;
        node.original_file_path = model.clone();
        order.push(node.unique_id.to_string());
        if manifest.add_node(node).is_some() {
            bail!("Model '{name}' was given more than once");
        }
    }
    Ok((manifest, order))
}
