//! Static call extraction.
//!
//! Parses a template with the same grammar the renderer uses and collects
//! the shape of every call to a plain name (`ref('a')`, `config(...)`)
//! without evaluating anything.

use std::collections::BTreeMap;

use minijinja::machinery::{ast, parse, WhitespaceConfig};
use minijinja::syntax::SyntaxConfig;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{CompileError, CompileResult};
use crate::functions::value_to_json;
use crate::symbols::SymbolTable;
use crate::syntax::rewrite_definitions;

/// One call argument: a literal, or the expression it was built from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Arg {
    Constant { value: serde_json::Value },
    Variable { name: String },
}

impl Arg {
    pub fn constant(value: impl Into<serde_json::Value>) -> Self {
        Arg::Constant {
            value: value.into(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Arg::Variable { name: name.into() }
    }

    /// The literal string value, if this is a string constant
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Constant { value } => value.as_str(),
            Arg::Variable { .. } => None,
        }
    }
}

/// Arguments of one call site
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallRecord {
    pub args: Vec<Arg>,
    pub kwargs: BTreeMap<String, Arg>,
}

/// Calls grouped by callee, callees in order of first appearance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallMap {
    entries: Vec<(String, Vec<CallRecord>)>,
}

impl CallMap {
    fn push(&mut self, callee: &str, record: CallRecord) {
        match self.entries.iter_mut().find(|(name, _)| name == callee) {
            Some((_, calls)) => calls.push(record),
            None => self.entries.push((callee.to_string(), vec![record])),
        }
    }

    /// Calls made to `callee`, in source order
    pub fn get(&self, callee: &str) -> &[CallRecord] {
        self.entries
            .iter()
            .find(|(name, _)| name == callee)
            .map(|(_, calls)| calls.as_slice())
            .unwrap_or(&[])
    }

    pub fn callees(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CallRecord])> {
        self.entries
            .iter()
            .map(|(name, calls)| (name.as_str(), calls.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CallMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, calls) in &self.entries {
            map.serialize_entry(name, calls)?;
        }
        map.end()
    }
}

/// Extraction result, serialized as `{"calls": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseResult {
    pub calls: CallMap,
}

/// Extract every call to a plain name in `source`.
///
/// Syntax errors are attributed to `node_id` when given.
pub fn extract(source: &str, node_id: Option<&str>) -> CompileResult<ParseResult> {
    let attribute = |err: CompileError| match node_id {
        Some(id) => err.with_node(id),
        None => err,
    };
    let rewritten = rewrite_definitions(source, &mut SymbolTable::new()).map_err(attribute)?;
    let tree = parse(
        &rewritten.source,
        node_id.unwrap_or("<template>"),
        SyntaxConfig::default(),
        WhitespaceConfig::default(),
    )
    .map_err(|e| CompileError::from_template_error(&e, node_id))?;

    let mut calls = CallMap::default();
    visit_stmt(&tree, &mut calls);
    Ok(ParseResult { calls })
}

fn visit_body(body: &[ast::Stmt<'_>], calls: &mut CallMap) {
    for stmt in body {
        visit_stmt(stmt, calls);
    }
}

fn visit_stmt(stmt: &ast::Stmt<'_>, calls: &mut CallMap) {
    match stmt {
        ast::Stmt::Template(t) => visit_body(&t.children, calls),
        ast::Stmt::EmitExpr(e) => visit_expr(&e.expr, calls),
        ast::Stmt::ForLoop(f) => {
            visit_expr(&f.target, calls);
            visit_expr(&f.iter, calls);
            if let Some(filter) = &f.filter_expr {
                visit_expr(filter, calls);
            }
            visit_body(&f.body, calls);
            visit_body(&f.else_body, calls);
        }
        ast::Stmt::IfCond(c) => {
            visit_expr(&c.expr, calls);
            visit_body(&c.true_body, calls);
            visit_body(&c.false_body, calls);
        }
        ast::Stmt::WithBlock(w) => {
            for (target, value) in &w.assignments {
                visit_expr(target, calls);
                visit_expr(value, calls);
            }
            visit_body(&w.body, calls);
        }
        ast::Stmt::Set(s) => {
            visit_expr(&s.target, calls);
            visit_expr(&s.expr, calls);
        }
        ast::Stmt::SetBlock(s) => {
            if let Some(filter) = &s.filter {
                visit_expr(filter, calls);
            }
            visit_body(&s.body, calls);
        }
        ast::Stmt::AutoEscape(a) => {
            visit_expr(&a.enabled, calls);
            visit_body(&a.body, calls);
        }
        ast::Stmt::FilterBlock(f) => {
            visit_expr(&f.filter, calls);
            visit_body(&f.body, calls);
        }
        ast::Stmt::Block(b) => visit_body(&b.body, calls),
        ast::Stmt::Macro(m) => {
            for default in &m.defaults {
                visit_expr(default, calls);
            }
            visit_body(&m.body, calls);
        }
        ast::Stmt::CallBlock(c) => {
            visit_call(&c.call, calls);
            visit_body(&c.macro_decl.body, calls);
        }
        ast::Stmt::Do(d) => visit_call(&d.call, calls),
        _ => {}
    }
}

fn visit_expr(expr: &ast::Expr<'_>, calls: &mut CallMap) {
    match expr {
        ast::Expr::Var(_) | ast::Expr::Const(_) => {}
        ast::Expr::UnaryOp(u) => visit_expr(&u.expr, calls),
        ast::Expr::BinOp(b) => {
            visit_expr(&b.left, calls);
            visit_expr(&b.right, calls);
        }
        ast::Expr::IfExpr(i) => {
            visit_expr(&i.test_expr, calls);
            visit_expr(&i.true_expr, calls);
            if let Some(false_expr) = &i.false_expr {
                visit_expr(false_expr, calls);
            }
        }
        ast::Expr::Filter(f) => {
            if let Some(inner) = &f.expr {
                visit_expr(inner, calls);
            }
            visit_args(&f.args, calls);
        }
        ast::Expr::Test(t) => {
            visit_expr(&t.expr, calls);
            visit_args(&t.args, calls);
        }
        ast::Expr::GetAttr(g) => visit_expr(&g.expr, calls),
        ast::Expr::GetItem(g) => {
            visit_expr(&g.expr, calls);
            visit_expr(&g.subscript_expr, calls);
        }
        ast::Expr::Slice(s) => {
            visit_expr(&s.expr, calls);
            for part in [&s.start, &s.stop, &s.step].into_iter().flatten() {
                visit_expr(part, calls);
            }
        }
        ast::Expr::Call(c) => visit_call(c, calls),
        ast::Expr::List(l) => {
            for item in &l.items {
                visit_expr(item, calls);
            }
        }
        ast::Expr::Map(m) => {
            for item in m.keys.iter().chain(m.values.iter()) {
                visit_expr(item, calls);
            }
        }
        #[allow(unreachable_patterns)]
        _ => {}
    }
}

/// Record `call` if its callee is a plain name, then visit its parts.
fn visit_call(call: &ast::Call<'_>, calls: &mut CallMap) {
    if let ast::Expr::Var(callee) = &call.expr {
        let mut record = CallRecord::default();
        for arg in &call.args {
            match arg {
                ast::CallArg::Pos(expr) => record.args.push(classify(expr)),
                ast::CallArg::Kwarg(key, expr) => {
                    record.kwargs.insert(key.to_string(), classify(expr));
                }
                ast::CallArg::PosSplat(_) | ast::CallArg::KwargSplat(_) => {
                    log::debug!("Ignoring splat argument in call to {}", callee.id);
                }
            }
        }
        calls.push(callee.id, record);
    } else {
        visit_expr(&call.expr, calls);
    }
    visit_args(&call.args, calls);
}

fn visit_args(args: &[ast::CallArg<'_>], calls: &mut CallMap) {
    for arg in args {
        match arg {
            ast::CallArg::Pos(expr)
            | ast::CallArg::Kwarg(_, expr)
            | ast::CallArg::PosSplat(expr)
            | ast::CallArg::KwargSplat(expr) => visit_expr(expr, calls),
        }
    }
}

fn classify(expr: &ast::Expr<'_>) -> Arg {
    match fold_constant(expr) {
        Some(value) => Arg::Constant { value },
        None => Arg::Variable {
            name: symbolic_name(expr),
        },
    }
}

/// Reduce a literal expression to its value.
fn fold_constant(expr: &ast::Expr<'_>) -> Option<serde_json::Value> {
    match expr {
        ast::Expr::Const(c) => Some(value_to_json(&c.value)),
        ast::Expr::UnaryOp(u) if matches!(u.op, ast::UnaryOpKind::Neg) => {
            match fold_constant(&u.expr)? {
                serde_json::Value::Number(n) => n
                    .as_i64()
                    .and_then(i64::checked_neg)
                    .map(serde_json::Value::from)
                    .or_else(|| n.as_f64().map(|f| serde_json::Value::from(-f))),
                _ => None,
            }
        }
        ast::Expr::List(l) => l
            .items
            .iter()
            .map(fold_constant)
            .collect::<Option<Vec<_>>>()
            .map(serde_json::Value::Array),
        ast::Expr::Map(m) => {
            let mut object = serde_json::Map::new();
            for (key, value) in m.keys.iter().zip(m.values.iter()) {
                let key = match fold_constant(key)? {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                object.insert(key, fold_constant(value)?);
            }
            Some(serde_json::Value::Object(object))
        }
        _ => None,
    }
}

/// Readable name for a non-literal argument.
fn symbolic_name(expr: &ast::Expr<'_>) -> String {
    match expr {
        ast::Expr::Var(v) => v.id.to_string(),
        ast::Expr::GetAttr(g) => format!("{}.{}", symbolic_name(&g.expr), g.name),
        ast::Expr::GetItem(g) => format!("{}[]", symbolic_name(&g.expr)),
        ast::Expr::Call(c) => format!("{}()", symbolic_name(&c.expr)),
        ast::Expr::Filter(f) => match &f.expr {
            Some(inner) => format!("{}|{}", symbolic_name(inner), f.name),
            None => f.name.to_string(),
        },
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
#[path = "extractor_test.rs"]
mod tests;
