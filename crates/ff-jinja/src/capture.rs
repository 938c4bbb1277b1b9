//! Macro capture mode.
//!
//! Renders a template with every name it does not declare bound to a
//! recorder. Attribute access on a recorder yields a nested recorder and a
//! call records `{package, name}` and evaluates to `true`, so the shape of
//! calls to macros that are not loaded yet can be collected without a
//! resolution error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use minijinja::value::{Object, ObjectRepr};
use minijinja::{Error, ErrorKind, State, Value};
use serde::Serialize;

use crate::environment::MacroEnvironment;
use crate::error::{CompileError, CompileResult};
use crate::symbols::SymbolTable;
use crate::syntax::rewrite_definitions;

/// A macro reference found in capture mode
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CapturedMacro {
    /// Qualifying package, for `package.macro()` calls
    pub package: Option<String>,
    pub name: String,
}

type CaptureLog = Arc<Mutex<Vec<CapturedMacro>>>;

#[derive(Debug)]
struct MacroCapture {
    package: Option<String>,
    name: String,
    log: CaptureLog,
}

impl MacroCapture {
    fn record(&self) -> Result<(), Error> {
        let mut log = self.log.lock().map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("capture log poisoned: {e}"),
            )
        })?;
        log.push(CapturedMacro {
            package: self.package.clone(),
            name: self.name.clone(),
        });
        Ok(())
    }
}

impl Object for MacroCapture {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let attr = key.as_str()?;
        // Engine safety checks get a fixed answer.
        if attr == "unsafe_callable" || attr == "alters_data" {
            return Some(Value::from(false));
        }
        log::debug!("capture: {}.{attr}", self.name);
        Some(Value::from_object(MacroCapture {
            package: Some(self.name.clone()),
            name: attr.to_string(),
            log: Arc::clone(&self.log),
        }))
    }

    fn call(self: &Arc<Self>, _state: &State<'_, '_>, _args: &[Value]) -> Result<Value, Error> {
        self.record()?;
        Ok(Value::from(true))
    }

    fn render(self: &Arc<Self>, _f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self: Sized + 'static,
    {
        Ok(())
    }
}

impl MacroEnvironment {
    /// Render `source` in capture mode and return the macro calls it makes,
    /// de-duplicated, in first-call order.
    ///
    /// Names in `ctx` and environment globals keep their real values.
    pub fn capture_macros(
        &self,
        source: &str,
        ctx: BTreeMap<String, Value>,
        node_id: Option<&str>,
    ) -> CompileResult<Vec<CapturedMacro>> {
        let translate = |e: Error| CompileError::from_template_error(&e, node_id);
        let rewritten = rewrite_definitions(source, &mut SymbolTable::new()).map_err(|e| match node_id {
            Some(id) => e.with_node(id),
            None => e,
        })?;

        let name = node_id.unwrap_or("<capture>").to_string();
        let mut engine = self.engine().clone();
        engine
            .add_template_owned(name.clone(), rewritten.source)
            .map_err(translate)?;
        let template = engine.get_template(&name).map_err(translate)?;

        let log: CaptureLog = Arc::new(Mutex::new(Vec::new()));
        let mut values = ctx;
        let mut undeclared: Vec<String> = template.undeclared_variables(false).into_iter().collect();
        undeclared.sort();
        for var in undeclared {
            if values.contains_key(&var) || self.is_global(&var) {
                continue;
            }
            let recorder = MacroCapture {
                package: None,
                name: var.clone(),
                log: Arc::clone(&log),
            };
            values.insert(var, Value::from_object(recorder));
        }

        template
            .render(Value::from_iter(values))
            .map_err(translate)?;

        let recorded = log
            .lock()
            .map_err(|e| CompileError::internal(format!("capture log poisoned: {e}")))?;
        let mut captured: Vec<CapturedMacro> = Vec::with_capacity(recorded.len());
        for entry in recorded.iter() {
            if !captured.contains(entry) {
                captured.push(entry.clone());
            }
        }
        Ok(captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TemplateContext;

    fn env() -> MacroEnvironment {
        MacroEnvironment::builder(TemplateContext::default())
            .build()
            .unwrap()
    }

    fn captured(source: &str) -> Vec<(Option<String>, String)> {
        env()
            .capture_macros(source, BTreeMap::new(), Some("model.pkg.m"))
            .unwrap()
            .into_iter()
            .map(|c| (c.package, c.name))
            .collect()
    }

    #[test]
    fn test_records_bare_and_qualified_calls() {
        let calls = captured(
            "select {{ star('a') }}, {{ utils.surrogate_key(['a', 'b']) }} from {{ ref('x') }}",
        );
        assert_eq!(
            calls,
            vec![
                (None, "star".to_string()),
                (Some("utils".to_string()), "surrogate_key".to_string()),
                (None, "ref".to_string()),
            ]
        );
    }

    #[test]
    fn test_calls_are_deduplicated_and_truthy() {
        let calls = captured("{% if is_incremental() %}a{% endif %}{{ is_incremental() }}");
        assert_eq!(calls, vec![(None, "is_incremental".to_string())]);
    }

    #[test]
    fn test_plain_access_is_not_recorded() {
        let calls = captured("{{ some_value }}{{ pkg.attr }}");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_context_and_globals_are_not_captured() {
        let mut ctx = BTreeMap::new();
        ctx.insert("ref".to_string(), Value::from_function(|name: &str| name.to_string()));
        let calls = env()
            .capture_macros("{{ ref('a') }}{{ var('x', 1) }}{{ my_macro() }}", ctx, None)
            .unwrap();
        assert_eq!(
            calls,
            vec![CapturedMacro {
                package: None,
                name: "my_macro".to_string()
            }]
        );
    }
}
