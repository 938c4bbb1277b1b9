//! ff-jinja - template layer for Featherflow
//!
//! Static call extraction, macro definitions and their reserved internal
//! names, the per-package macro namespace, and the sandboxed environment
//! macros and models are rendered in.
//!
//! ```
//! use ff_jinja::extract;
//!
//! let result = extract("select * from {{ ref('orders') }}", None).unwrap();
//! assert_eq!(result.calls.get("ref")[0].args[0].as_str(), Some("orders"));
//! ```

pub mod capture;
pub mod context;
pub mod environment;
pub mod error;
pub mod extractor;
pub mod functions;
pub mod macros;
pub mod namespace;
pub mod symbols;
pub mod syntax;

pub use capture::CapturedMacro;
pub use context::{TargetContext, TemplateContext};
pub use environment::{MacroEnvironment, MacroEnvironmentBuilder};
pub use error::{CompileError, CompileResult};
pub use extractor::{extract, Arg, CallMap, CallRecord, ParseResult};
pub use functions::{make_config_fn, value_to_json, ConfigCapture};
pub use macros::{parse_macros, MacroDef, MacroFile};
pub use namespace::{MacroNamespace, BUILTIN_PACKAGE};
pub use symbols::{materialization_macro_name, SymbolKey, SymbolTable};
