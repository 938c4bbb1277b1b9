//! Macro execution environment
//!
//! Every macro file is registered as a template after its definitions have
//! been renamed. A macro is never called through the template that defined
//! it; instead each one is exposed to renders as a [`MacroCall`] that
//! re-evaluates its module against the current render context on every
//! call, catches `return(...)` at its own boundary and records itself in
//! the call stack of any error passing through it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock, Weak};

use minijinja::value::{Object, ObjectRepr};
use minijinja::{Environment, Error, State, UndefinedBehavior, Value};

use crate::context::TemplateContext;
use crate::error::{find_source, CompileError, CompileResult, MacroReturn};
use crate::functions::{
    exceptions_namespace, from_json, make_env_var_fn, make_log_fn, make_var_fn,
    raise_compiler_error, return_fn, to_json,
};
use crate::macros::{parse_macros, MacroDef, MacroFile};
use crate::namespace::{MacroNamespace, BUILTIN_PACKAGE};
use crate::symbols::{SymbolKey, SymbolTable};
use crate::syntax::rewrite_definitions;

/// Macro files shipped with the engine: hook wrapping and the default
/// materializations.
const GLOBAL_PROJECT: &[(&str, &str)] = &[
    (
        "macros/wrap.sql",
        include_str!("../global_project/macros/wrap.sql"),
    ),
    (
        "macros/materializations/view.sql",
        include_str!("../global_project/macros/materializations/view.sql"),
    ),
    (
        "macros/materializations/table.sql",
        include_str!("../global_project/macros/materializations/table.sql"),
    ),
    (
        "macros/materializations/incremental.sql",
        include_str!("../global_project/macros/materializations/incremental.sql"),
    ),
];

/// Collects macro files before the environment is frozen.
#[derive(Debug, Default)]
pub struct MacroEnvironmentBuilder {
    context: TemplateContext,
    files: Vec<MacroFile>,
}

impl MacroEnvironmentBuilder {
    pub fn new(context: TemplateContext) -> Self {
        Self {
            context,
            files: Vec::new(),
        }
    }

    /// Add the builtin `featherflow` package.
    pub fn with_global_project(mut self) -> CompileResult<Self> {
        for (path, source) in GLOBAL_PROJECT {
            self.files.push(parse_macros(BUILTIN_PACKAGE, path, source)?);
        }
        Ok(self)
    }

    pub fn add_macro_file(mut self, package: &str, path: &str, source: &str) -> CompileResult<Self> {
        self.files.push(parse_macros(package, path, source)?);
        Ok(self)
    }

    /// Add every `.sql` file under `dir`, recursively, in path order.
    pub fn add_macro_dir(mut self, package: &str, dir: &Path) -> CompileResult<Self> {
        let mut paths = Vec::new();
        collect_sql_files(dir, &mut paths)?;
        paths.sort();
        for path in paths {
            let source = std::fs::read_to_string(&path).map_err(|e| {
                CompileError::internal(format!("failed to read {}: {e}", path.display()))
            })?;
            let relative = path.strip_prefix(dir).unwrap_or(&path);
            let relative = relative.to_string_lossy().replace('\\', "/");
            self.files.push(parse_macros(package, &relative, &source)?);
        }
        Ok(self)
    }

    pub fn build(self) -> CompileResult<MacroEnvironment> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        let mut globals: HashSet<String> = HashSet::new();
        let vars = Arc::new(self.context.vars.clone());
        env.add_function("var", make_var_fn(vars));
        env.add_function("env_var", make_env_var_fn());
        env.add_function("log", make_log_fn());
        env.add_function("return", return_fn);
        env.add_function("to_json", to_json);
        env.add_filter("to_json", to_json);
        env.add_function("from_json", from_json);
        env.add_function("raise_compiler_error", raise_compiler_error);
        env.add_global("exceptions", exceptions_namespace());
        globals.extend(
            [
                "var",
                "env_var",
                "log",
                "return",
                "to_json",
                "from_json",
                "raise_compiler_error",
                "exceptions",
            ]
            .map(String::from),
        );
        for (name, value) in self.context.to_values() {
            env.add_global(name.clone(), value);
            globals.insert(name);
        }

        let mut macros = Vec::new();
        for file in self.files {
            env.add_template_owned(file.template_name.clone(), file.source)
                .map_err(|e| CompileError::from_template_error(&e, Some(&file.template_name)))?;
            macros.extend(file.macros.into_iter().map(Arc::new));
        }
        log::debug!("Macro environment holds {} definitions", macros.len());

        Ok(MacroEnvironment {
            env: Arc::new(env),
            macros,
            globals,
            context: self.context,
        })
    }
}

fn collect_sql_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> CompileResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        CompileError::internal(format!("failed to read {}: {e}", dir.display()))
    })?;
    for entry in entries {
        let path = entry
            .map_err(|e| CompileError::internal(format!("failed to read {}: {e}", dir.display())))?
            .path();
        if path.is_dir() {
            collect_sql_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "sql") {
            out.push(path);
        }
    }
    Ok(())
}

/// Sandboxed renderer with every known macro loaded
#[derive(Debug)]
pub struct MacroEnvironment {
    env: Arc<Environment<'static>>,
    macros: Vec<Arc<MacroDef>>,
    globals: HashSet<String>,
    context: TemplateContext,
}

impl MacroEnvironment {
    pub fn builder(context: TemplateContext) -> MacroEnvironmentBuilder {
        MacroEnvironmentBuilder::new(context)
    }

    pub fn context(&self) -> &TemplateContext {
        &self.context
    }

    /// Every parsed definition, in load order
    pub fn macros(&self) -> &[Arc<MacroDef>] {
        &self.macros
    }

    /// Namespace for templates of `current_package`
    pub fn namespace(&self, current_package: &str) -> MacroNamespace {
        MacroNamespace::build(&self.macros, current_package)
    }

    /// Names defined by the environment itself rather than a render context
    pub(crate) fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub(crate) fn engine(&self) -> &Environment<'static> {
        &self.env
    }

    /// Render `source` with `namespace` and the per-node `extra` values.
    ///
    /// Errors are attributed to `node_id` when given.
    pub fn render(
        &self,
        source: &str,
        namespace: &MacroNamespace,
        extra: BTreeMap<String, Value>,
        node_id: Option<&str>,
    ) -> CompileResult<String> {
        let rewritten = rewrite_definitions(source, &mut SymbolTable::new())
            .map_err(|e| attribute(e, node_id))?;
        let scope = RenderScope::new(self, namespace, extra)?;
        self.env
            .render_named_str(node_id.unwrap_or("<template>"), &rewritten.source, scope.value())
            .map_err(|e| CompileError::from_template_error(&e, node_id))
    }

    /// Call one macro directly, as the wrapper does with materializations.
    pub fn call_macro(
        &self,
        def: &Arc<MacroDef>,
        args: &[Value],
        namespace: &MacroNamespace,
        extra: BTreeMap<String, Value>,
        node_id: Option<&str>,
    ) -> CompileResult<Value> {
        let scope = RenderScope::new(self, namespace, extra)?;
        scope
            .bind(def)
            .invoke(args)
            .map_err(|e| CompileError::from_template_error(&e, node_id))
    }

    /// Render the docs block `name` from `package`.
    pub fn render_docs(&self, package: &str, name: &str) -> CompileResult<String> {
        let key = SymbolKey::docs(name);
        let def = self
            .macros
            .iter()
            .find(|def| def.key == key && def.package_name == package)
            .ok_or_else(|| {
                CompileError::undefined(format!("docs block '{name}' not found in package '{package}'"))
            })?;
        let value = self.call_macro(
            def,
            &[],
            &self.namespace(package),
            BTreeMap::new(),
            Some(&def.unique_id.to_string()),
        )?;
        Ok(value.to_string())
    }
}

fn attribute(err: CompileError, node_id: Option<&str>) -> CompileError {
    match node_id {
        Some(id) => err.with_node(id),
        None => err,
    }
}

/// The context of one render: namespace entries bound to a shared slot
/// plus per-node values. Macro calls read the slot each time they run.
struct RenderScope<'e> {
    env: &'e MacroEnvironment,
    slot: Arc<RwLock<Value>>,
}

impl<'e> RenderScope<'e> {
    fn new(
        env: &'e MacroEnvironment,
        namespace: &MacroNamespace,
        extra: BTreeMap<String, Value>,
    ) -> CompileResult<Self> {
        let scope = Self {
            env,
            slot: Arc::new(RwLock::new(Value::UNDEFINED)),
        };
        let mut entries = namespace.to_values(|def| Value::from_object(scope.bind(def)));
        entries.extend(extra);
        let mut slot = scope
            .slot
            .write()
            .map_err(|e| CompileError::internal(format!("render context lock poisoned: {e}")))?;
        *slot = Value::from_iter(entries);
        drop(slot);
        Ok(scope)
    }

    fn value(&self) -> Value {
        self.slot
            .read()
            .map(|ctx| ctx.clone())
            .unwrap_or(Value::UNDEFINED)
    }

    fn bind(&self, def: &Arc<MacroDef>) -> MacroCall {
        MacroCall {
            env: Arc::clone(&self.env.env),
            def: Arc::clone(def),
            ctx: Arc::downgrade(&self.slot),
        }
    }
}

/// Call adapter for one macro
#[derive(Debug)]
pub(crate) struct MacroCall {
    env: Arc<Environment<'static>>,
    def: Arc<MacroDef>,
    ctx: Weak<RwLock<Value>>,
}

impl MacroCall {
    fn invoke(&self, args: &[Value]) -> Result<Value, Error> {
        let ctx = self
            .ctx
            .upgrade()
            .ok_or_else(|| {
                CompileError::internal(format!(
                    "{} was called after its render finished",
                    self.def.unique_id
                ))
                .into_template_error()
            })?
            .read()
            .map(|ctx| ctx.clone())
            .map_err(|e| {
                CompileError::internal(format!("render context lock poisoned: {e}"))
                    .into_template_error()
            })?;

        let template = self.env.get_template(&self.def.template_name)?;
        let module = template
            .eval_to_state(ctx)
            .map_err(|e| self.unwind(e))?;
        let body = module.lookup(&self.def.internal_name).ok_or_else(|| {
            CompileError::internal(format!(
                "{} is missing from {}",
                self.def.internal_name, self.def.template_name
            ))
            .into_template_error()
        })?;

        match body.call(&module, args) {
            Ok(value) => Ok(value),
            Err(err) => match find_source::<MacroReturn>(&err) {
                Some(returned) => Ok(returned.value.clone()),
                None => Err(self.unwind(err)),
            },
        }
    }

    /// Re-raise `err` with this macro recorded in its call stack.
    fn unwind(&self, err: Error) -> Error {
        CompileError::from_template_error(&err, None)
            .push_caller(&self.def.unique_id.to_string())
            .into_template_error()
    }
}

impl Object for MacroCall {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call(self: &Arc<Self>, _state: &State<'_, '_>, args: &[Value]) -> Result<Value, Error> {
        self.invoke(args)
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self: Sized + 'static,
    {
        write!(f, "<macro {}>", self.def.unique_id)
    }
}

#[cfg(test)]
#[path = "environment_test.rs"]
mod tests;
