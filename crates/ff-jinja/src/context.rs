//! Base render context shared by every template in one compilation run.

use std::collections::{BTreeMap, HashMap};

use ff_core::config::{CompileFlags, ProjectConfig, TargetConfig};
use minijinja::Value;
use serde::Serialize;

use crate::functions::yaml_to_json;

/// Invocation-level values visible to every template.
///
/// Exposes `project_name`, `target`, `invocation_id`, `run_started_at`,
/// `ff_version`, `flags` and `env`.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    /// Root package name
    pub project_name: String,
    pub target: TargetContext,
    pub flags: CompileFlags,
    /// Project variables read by `var()`
    pub vars: HashMap<String, serde_json::Value>,
    /// Unique identifier for this invocation (UUID v4)
    pub invocation_id: String,
    /// RFC 3339 timestamp when the run started
    pub run_started_at: String,
    pub ff_version: String,
}

impl TemplateContext {
    /// Create a context, generating `invocation_id` and `run_started_at`.
    pub fn new(project_name: impl Into<String>, target: TargetContext, flags: CompileFlags) -> Self {
        Self {
            project_name: project_name.into(),
            target,
            flags,
            vars: HashMap::new(),
            invocation_id: uuid::Uuid::new_v4().to_string(),
            run_started_at: chrono::Utc::now().to_rfc3339(),
            ff_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Context for a loaded project: its name, target, flags and vars.
    pub fn from_project(project: &ProjectConfig) -> Self {
        Self::new(
            project.name.clone(),
            TargetContext::from(&project.target),
            project.flags,
        )
        .with_vars(
            project
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), yaml_to_json(v))),
        )
    }

    pub fn with_vars<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        self.vars.extend(vars);
        self
    }

    /// Template globals for this context
    pub fn to_values(&self) -> BTreeMap<String, Value> {
        let target = Value::from_serialize(&self.target);
        let mut values = BTreeMap::new();
        values.insert("project_name".to_string(), Value::from(self.project_name.as_str()));
        values.insert("env".to_string(), target.clone());
        values.insert("target".to_string(), target);
        values.insert("flags".to_string(), Value::from_serialize(self.flags));
        values.insert(
            "invocation_id".to_string(),
            Value::from(self.invocation_id.as_str()),
        );
        values.insert(
            "run_started_at".to_string(),
            Value::from(self.run_started_at.as_str()),
        );
        values.insert("ff_version".to_string(), Value::from(self.ff_version.as_str()));
        values
    }
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self::new(String::new(), TargetContext::default(), CompileFlags::default())
    }
}

/// Target exposed to templates as `{{ target.schema }}`, `{{ target.type }}`
#[derive(Debug, Clone, Serialize)]
pub struct TargetContext {
    pub name: String,
    pub schema: String,
    /// Adapter type (postgres, redshift, ...)
    #[serde(rename = "type")]
    pub adapter_type: String,
}

impl Default for TargetContext {
    fn default() -> Self {
        Self::from(&TargetConfig::default())
    }
}

impl From<&TargetConfig> for TargetContext {
    fn from(target: &TargetConfig) -> Self {
        Self {
            name: target.name.clone(),
            schema: target.schema.clone(),
            adapter_type: target.adapter_type.clone(),
        }
    }
}
