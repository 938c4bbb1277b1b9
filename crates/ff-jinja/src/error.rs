//! Error types for ff-jinja
//!
//! [`CompileError`] is the single error type every compilation step reports.
//! It can travel through a render as the source of a `minijinja::Error`, so a
//! failure raised deep inside nested macro calls comes back out unchanged.

use std::error::Error as StdError;
use std::fmt;

use minijinja::{Error, ErrorKind, Value};
use thiserror::Error;

/// Compilation failure for one node
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Malformed template (J001)
    #[error("[J001] Template syntax error{}: {message}", at_node(.node, .line))]
    TemplateSyntax {
        node: Option<String>,
        message: String,
        line: Option<usize>,
    },

    /// Unresolved variable, macro or function (J002)
    #[error(
        "[J002] Undefined reference{}: {message}{}",
        at_node(.node, &None),
        call_stack(.stack)
    )]
    UndefinedReference {
        node: Option<String>,
        message: String,
        /// Macros the lookup happened in, outermost first
        stack: Vec<String>,
    },

    /// Failure inside a macro body (J003)
    #[error(
        "[J003] Macro runtime error{}: {message}{}",
        at_node(.node, &None),
        call_stack(.stack)
    )]
    MacroRuntime {
        node: Option<String>,
        message: String,
        /// Macro unique ids from the outermost call to the failing one
        stack: Vec<String>,
    },

    /// Invalid node or project configuration (J004)
    #[error("[J004] Configuration error{}: {message}", at_node(.node, &None))]
    Configuration {
        node: Option<String>,
        message: String,
    },

    /// Internal error (J005)
    #[error("[J005] Internal error{}: {message}", at_node(.node, &None))]
    Internal {
        node: Option<String>,
        message: String,
    },
}

/// Result type alias for CompileError
pub type CompileResult<T> = Result<T, CompileError>;

fn at_node(node: &Option<String>, line: &Option<usize>) -> String {
    match (node, line) {
        (Some(node), Some(line)) => format!(" in {node} (line {line})"),
        (Some(node), None) => format!(" in {node}"),
        (None, Some(line)) => format!(" (line {line})"),
        (None, None) => String::new(),
    }
}

fn call_stack(stack: &[String]) -> String {
    if stack.is_empty() {
        String::new()
    } else {
        format!("\n  called by: {}", stack.join(" -> "))
    }
}

impl CompileError {
    pub fn syntax(message: impl Into<String>) -> Self {
        CompileError::TemplateSyntax {
            node: None,
            message: message.into(),
            line: None,
        }
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        CompileError::UndefinedReference {
            node: None,
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// A macro runtime error with an empty call stack
    pub fn runtime(message: impl Into<String>) -> Self {
        CompileError::MacroRuntime {
            node: None,
            message: message.into(),
            stack: Vec::new(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        CompileError::Configuration {
            node: None,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal {
            node: None,
            message: message.into(),
        }
    }

    /// The node this error is attributed to
    pub fn node(&self) -> Option<&str> {
        match self {
            CompileError::TemplateSyntax { node, .. }
            | CompileError::UndefinedReference { node, .. }
            | CompileError::MacroRuntime { node, .. }
            | CompileError::Configuration { node, .. }
            | CompileError::Internal { node, .. } => node.as_deref(),
        }
    }

    /// The message without code or node prefix
    pub fn message(&self) -> &str {
        match self {
            CompileError::TemplateSyntax { message, .. }
            | CompileError::UndefinedReference { message, .. }
            | CompileError::MacroRuntime { message, .. }
            | CompileError::Configuration { message, .. }
            | CompileError::Internal { message, .. } => message,
        }
    }

    /// Macro call stack, outermost call first; empty for kinds raised
    /// outside any macro body
    pub fn stack(&self) -> &[String] {
        match self {
            CompileError::MacroRuntime { stack, .. }
            | CompileError::UndefinedReference { stack, .. } => stack,
            _ => &[],
        }
    }

    /// Attribute the error to `node_id` unless it already names a node.
    pub fn with_node(mut self, node_id: &str) -> Self {
        match &mut self {
            CompileError::TemplateSyntax { node, .. }
            | CompileError::UndefinedReference { node, .. }
            | CompileError::MacroRuntime { node, .. }
            | CompileError::Configuration { node, .. }
            | CompileError::Internal { node, .. } => {
                if node.is_none() {
                    *node = Some(node_id.to_string());
                }
            }
        }
        self
    }

    /// Record that the failure passed through a call to `macro_id`.
    ///
    /// Calls unwind innermost first, so each boundary goes to the front.
    pub(crate) fn push_caller(mut self, macro_id: &str) -> Self {
        if let CompileError::MacroRuntime { stack, .. }
        | CompileError::UndefinedReference { stack, .. } = &mut self
        {
            stack.insert(0, macro_id.to_string());
        }
        self
    }

    /// Wrap into a template error that carries `self` as its source.
    pub fn into_template_error(self) -> Error {
        let kind = match self {
            CompileError::UndefinedReference { .. } => ErrorKind::UndefinedError,
            CompileError::TemplateSyntax { .. } => ErrorKind::SyntaxError,
            _ => ErrorKind::InvalidOperation,
        };
        Error::new(kind, self.message().to_string()).with_source(self)
    }

    /// Translate a template engine error from rendering `node_id`.
    pub fn from_template_error(err: &Error, node_id: Option<&str>) -> Self {
        let translated = if let Some(compile) = find_source::<CompileError>(err) {
            compile.clone()
        } else if find_source::<MacroReturn>(err).is_some() {
            CompileError::runtime("return() was called outside of a macro")
        } else {
            match err.kind() {
                ErrorKind::SyntaxError | ErrorKind::BadEscape => CompileError::TemplateSyntax {
                    node: None,
                    message: describe(err),
                    line: err.line(),
                },
                ErrorKind::UndefinedError
                | ErrorKind::UnknownFunction
                | ErrorKind::UnknownFilter
                | ErrorKind::UnknownTest
                | ErrorKind::UnknownMethod => CompileError::undefined(describe(err)),
                ErrorKind::TemplateNotFound => CompileError::internal(describe(err)),
                _ => CompileError::runtime(describe(err)),
            }
        };
        match node_id {
            Some(id) => translated.with_node(id),
            None => translated,
        }
    }
}

fn describe(err: &Error) -> String {
    let what = match err.detail() {
        Some(detail) => detail.to_string(),
        None => err.kind().to_string(),
    };
    match (err.name(), err.line()) {
        (Some(name), Some(line)) => format!("{what} ({name}:{line})"),
        (Some(name), None) => format!("{what} ({name})"),
        _ => what,
    }
}

/// Find the first error of type `T` in `err`'s source chain.
pub(crate) fn find_source<T: StdError + 'static>(err: &Error) -> Option<&T> {
    let mut current: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(source) = current {
        if let Some(found) = source.downcast_ref::<T>() {
            return Some(found);
        }
        current = source.source();
    }
    None
}

/// Early-return signal raised by `return(value)` and caught at the
/// enclosing macro's call boundary.
#[derive(Debug, Clone)]
pub struct MacroReturn {
    pub value: Value,
}

impl fmt::Display for MacroReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("macro return")
    }
}

impl StdError for MacroReturn {}

impl MacroReturn {
    pub(crate) fn into_template_error(self) -> Error {
        Error::new(ErrorKind::InvalidOperation, "return").with_source(self)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
