//! Template functions: var(), env_var(), log(), return(), to_json(),
//! from_json(), raise_compiler_error() and the per-node config() capture.

use minijinja::value::{Kwargs, Value};
use minijinja::{Error, ErrorKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::{CompileError, MacroReturn};

/// Values captured from `config(...)` calls during one render
pub type ConfigCapture = Arc<Mutex<BTreeMap<String, serde_json::Value>>>;

/// Create the var() function that reads project variables
///
/// Usage in templates:
/// ```jinja
/// {{ var('start_date') }}
/// {{ var('missing', 'default_value') }}
/// ```
pub(crate) fn make_var_fn(
    vars: Arc<HashMap<String, serde_json::Value>>,
) -> impl Fn(&str, Option<Value>) -> Result<Value, Error> + Send + Sync + Clone + 'static {
    move |name: &str, default: Option<Value>| match (vars.get(name), default) {
        (Some(value), _) => Ok(Value::from_serialize(value)),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(CompileError::undefined(format!(
            "Required var '{name}' not found in config and no default was provided"
        ))
        .into_template_error()),
    }
}

/// Create the `env_var(name, default?)` function to read environment variables.
pub(crate) fn make_env_var_fn(
) -> impl Fn(&str, Option<Value>) -> Result<String, Error> + Send + Sync + Clone + 'static {
    |name: &str, default: Option<Value>| match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(CompileError::undefined(format!(
            "Env var '{name}' is not set and no default was provided"
        ))
        .into_template_error()),
    }
}

/// Create the `log(msg)` function for template debugging.
///
/// Prints the message to stderr and renders nothing.
pub(crate) fn make_log_fn() -> impl Fn(&Value) -> String + Send + Sync + Clone + 'static {
    |msg: &Value| {
        eprintln!("[jinja:log] {msg}");
        String::new()
    }
}

/// `return(value)` ends the enclosing macro with `value` as its result.
pub(crate) fn return_fn(value: Option<Value>) -> Result<Value, Error> {
    Err(MacroReturn {
        value: value.unwrap_or_default(),
    }
    .into_template_error())
}

/// `raise_compiler_error(msg)` fails the compilation from inside a template.
pub(crate) fn raise_compiler_error(msg: &str) -> Result<Value, Error> {
    Err(CompileError::runtime(msg).into_template_error())
}

/// The `exceptions` namespace: `exceptions.raise_compiler_error(msg)`
pub(crate) fn exceptions_namespace() -> Value {
    Value::from_iter([(
        "raise_compiler_error",
        Value::from_function(raise_compiler_error),
    )])
}

/// `from_json(str)` parses a JSON document into a template value.
pub(crate) fn from_json(s: &str) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(s).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("from_json parse error: {e}"),
        )
    })?;
    Ok(Value::from_serialize(&parsed))
}

/// `to_json(value)` serializes a template value; also registered as a filter.
pub(crate) fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value_to_json(&value)).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("to_json serialization error: {e}"),
        )
    })
}

/// Create the config() function that captures node configuration
///
/// Usage in templates:
/// ```jinja
/// {{ config(materialized='table', sort=['id']) }}
/// ```
pub fn make_config_fn(
    capture: ConfigCapture,
) -> impl Fn(Kwargs) -> Result<String, Error> + Send + Sync + Clone + 'static {
    move |kwargs: Kwargs| {
        let mut captured = capture.lock().map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("config mutex poisoned: {e}"),
            )
        })?;
        for key in kwargs.args() {
            let value = kwargs.get::<Value>(key)?;
            captured.insert(key.to_string(), value_to_json(&value));
        }
        Ok(String::new())
    }
}

/// Convert a template value to JSON; undefined becomes null.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    if value.is_undefined() {
        return serde_json::Value::Null;
    }
    serde_json::to_value(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
}

/// Convert serde_yaml::Value to serde_json::Value
pub fn yaml_to_json(yaml: &serde_yaml::Value) -> serde_json::Value {
    use serde_yaml::Value as Yaml;
    match yaml {
        Yaml::Null => serde_json::Value::Null,
        Yaml::Bool(b) => serde_json::Value::Bool(*b),
        Yaml::Number(n) => yaml_number_to_json(n),
        Yaml::String(s) => serde_json::Value::String(s.clone()),
        Yaml::Sequence(seq) => serde_json::Value::Array(seq.iter().map(yaml_to_json).collect()),
        Yaml::Mapping(map) => serde_json::Value::Object(
            map.iter()
                .filter_map(|(k, v)| k.as_str().map(|key| (key.to_string(), yaml_to_json(v))))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

fn yaml_number_to_json(n: &serde_yaml::Number) -> serde_json::Value {
    if let Some(i) = n.as_i64() {
        return serde_json::Value::from(i);
    }
    match n.as_f64().and_then(serde_json::Number::from_f64) {
        Some(num) => serde_json::Value::Number(num),
        None => {
            log::warn!("YAML number {n} has no JSON representation; using null");
            serde_json::Value::Null
        }
    }
}

#[cfg(test)]
#[path = "functions_test.rs"]
mod tests;
