//! Macro file parsing.
//!
//! A macro file is rewritten once (see [`crate::syntax`]) and every
//! definition it declares becomes a [`MacroDef`] that points back at the
//! rewritten file by template name.

use std::collections::HashSet;

use ff_core::node::{NodeType, UniqueId};
use minijinja::machinery::{ast, parse, WhitespaceConfig};
use minijinja::syntax::SyntaxConfig;
use serde::Serialize;

use crate::error::{CompileError, CompileResult};
use crate::symbols::{SymbolKey, SymbolTable};
use crate::syntax::rewrite_definitions;

/// One macro, materialization or docs definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroDef {
    /// `macro.<package>.<name>` (`docs.<package>.<name>` for docs blocks)
    pub unique_id: UniqueId,
    pub key: SymbolKey,
    /// Identifier the definition is registered under in its template
    pub internal_name: String,
    /// Name callers use
    pub name: String,
    pub package_name: String,
    pub path: String,
    /// Formal parameter names, in declaration order
    pub arguments: Vec<String>,
    /// Name of the rewritten template that defines it
    pub template_name: String,
}

/// A parsed macro file: its rewritten source and definitions
#[derive(Debug, Clone)]
pub struct MacroFile {
    pub template_name: String,
    pub source: String,
    pub macros: Vec<MacroDef>,
}

/// Template name a package's macro file is registered under
pub fn template_name(package: &str, path: &str) -> String {
    format!("{package}://{path}")
}

/// Parse the definitions in one macro file.
pub fn parse_macros(package: &str, path: &str, source: &str) -> CompileResult<MacroFile> {
    let template_name = template_name(package, path);
    let mut symbols = SymbolTable::new();
    let rewritten = rewrite_definitions(source, &mut symbols)
        .map_err(|e| e.with_node(&template_name))?;

    let mut seen = HashSet::new();
    for def in &rewritten.definitions {
        if !seen.insert(&def.key) {
            return Err(CompileError::TemplateSyntax {
                node: Some(template_name.clone()),
                message: format!("{} is defined more than once", def.key),
                line: Some(def.line),
            });
        }
    }

    let tree = parse(
        &rewritten.source,
        &template_name,
        SyntaxConfig::default(),
        WhitespaceConfig::default(),
    )
    .map_err(|e| CompileError::from_template_error(&e, Some(&template_name)))?;

    let mut signatures = Vec::new();
    collect_signatures(&tree, &mut signatures);

    let mut macros = Vec::with_capacity(rewritten.definitions.len());
    for def in rewritten.definitions {
        let arguments = signatures
            .iter()
            .find(|(name, _)| *name == def.internal_name)
            .map(|(_, args)| args.clone())
            .unwrap_or_default();
        let resource_type = if def.key.is_docs() {
            NodeType::Docs
        } else {
            NodeType::Macro
        };
        let name = def.key.source_name();
        let unique_id = UniqueId::new(resource_type, package, name.as_str()).map_err(|e| {
            CompileError::TemplateSyntax {
                node: Some(template_name.clone()),
                message: e.to_string(),
                line: Some(def.line),
            }
        })?;
        macros.push(MacroDef {
            unique_id,
            key: def.key,
            internal_name: def.internal_name,
            name,
            package_name: package.to_string(),
            path: path.to_string(),
            arguments,
            template_name: template_name.clone(),
        });
    }

    log::debug!("Parsed {} definitions from {template_name}", macros.len());
    Ok(MacroFile {
        template_name,
        source: rewritten.source,
        macros,
    })
}

/// Collect `(name, parameters)` of every macro declared outside other macros.
fn collect_signatures<'a>(stmt: &ast::Stmt<'a>, out: &mut Vec<(&'a str, Vec<String>)>) {
    match stmt {
        ast::Stmt::Template(t) => walk(&t.children, out),
        ast::Stmt::Macro(m) => {
            let args = m
                .args
                .iter()
                .filter_map(|arg| match arg {
                    ast::Expr::Var(var) => Some(var.id.to_string()),
                    _ => None,
                })
                .collect();
            out.push((m.name, args));
        }
        ast::Stmt::IfCond(c) => {
            walk(&c.true_body, out);
            walk(&c.false_body, out);
        }
        ast::Stmt::ForLoop(f) => {
            walk(&f.body, out);
            walk(&f.else_body, out);
        }
        ast::Stmt::WithBlock(w) => walk(&w.body, out),
        _ => {}
    }
}

fn walk<'a>(stmts: &[ast::Stmt<'a>], out: &mut Vec<(&'a str, Vec<String>)>) {
    for stmt in stmts {
        collect_signatures(stmt, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_macros_and_arguments() {
        let source = "{% macro cents(column, scale=2) %}({{ column }} / 100)::numeric(16, {{ scale }}){% endmacro %}\n\
                      {% materialization view(sql, pre_hooks), default %}{{ sql }}{% endmaterialization %}\n\
                      {% docs orders %}Orders.{% enddocs %}";
        let file = parse_macros("jaffle", "macros/utils.sql", source).unwrap();
        assert_eq!(file.template_name, "jaffle://macros/utils.sql");
        assert_eq!(file.macros.len(), 3);

        let cents = &file.macros[0];
        assert_eq!(cents.unique_id.to_string(), "macro.jaffle.cents");
        assert_eq!(cents.name, "cents");
        assert_eq!(cents.internal_name, "__macro__cents");
        assert_eq!(cents.arguments, vec!["column", "scale"]);

        let view = &file.macros[1];
        assert_eq!(
            view.unique_id.to_string(),
            "macro.jaffle.materialization_view_default"
        );
        assert_eq!(view.arguments, vec!["sql", "pre_hooks"]);

        let docs = &file.macros[2];
        assert_eq!(docs.unique_id.to_string(), "docs.jaffle.orders");
        assert!(docs.arguments.is_empty());
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let err = parse_macros(
            "pkg",
            "m.sql",
            "{% macro a() %}{% endmacro %}\n{% macro a() %}{% endmacro %}",
        )
        .unwrap_err();
        assert!(err.message().contains("more than once"), "{err}");
        assert_eq!(err.node(), Some("pkg://m.sql"));
    }

    #[test]
    fn test_syntax_error_attributed_to_file() {
        let err = parse_macros("pkg", "bad.sql", "{% macro a() %}{% if %}{% endmacro %}")
            .unwrap_err();
        assert!(matches!(err, CompileError::TemplateSyntax { .. }), "{err}");
        assert_eq!(err.node(), Some("pkg://bad.sql"));
    }
}
