//! Two-level macro lookup for one rendering pass.
//!
//! Macros from the builtin package and the package being compiled are
//! reachable by bare name; every macro is reachable as
//! `package_name.macro_name`. Bare-name resolution is fixed: builtin
//! macros first, then the current package, so the current package
//! always wins. Within one package the macro parsed last wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use minijinja::Value;

use crate::macros::MacroDef;
use crate::symbols::SymbolKey;

/// Package whose macros are visible by bare name in every package
pub const BUILTIN_PACKAGE: &str = "featherflow";

/// Read-only macro namespace
#[derive(Debug, Clone, Default)]
pub struct MacroNamespace {
    current_package: String,
    unqualified: BTreeMap<String, Arc<MacroDef>>,
    packages: BTreeMap<String, BTreeMap<String, Arc<MacroDef>>>,
}

impl MacroNamespace {
    /// Build the namespace seen by templates of `current_package`.
    pub fn build(macros: &[Arc<MacroDef>], current_package: &str) -> Self {
        let mut packages: BTreeMap<String, BTreeMap<String, Arc<MacroDef>>> = BTreeMap::new();
        for def in macros.iter().filter(|m| !m.key.is_docs()) {
            let package = packages.entry(def.package_name.clone()).or_default();
            if let Some(previous) = package.insert(def.name.clone(), Arc::clone(def)) {
                log::debug!(
                    "{} overrides {} ({} replaces {})",
                    def.unique_id,
                    previous.unique_id,
                    def.path,
                    previous.path
                );
            }
        }

        let mut unqualified = BTreeMap::new();
        for package in [BUILTIN_PACKAGE, current_package] {
            let Some(defs) = packages.get(package) else {
                continue;
            };
            for (name, def) in defs {
                if let Some(previous) = unqualified.insert(name.clone(), Arc::clone(def)) {
                    if previous.package_name != def.package_name {
                        log::debug!("{} shadows {}", def.unique_id, previous.unique_id);
                    }
                }
            }
        }

        Self {
            current_package: current_package.to_string(),
            unqualified,
            packages,
        }
    }

    pub fn current_package(&self) -> &str {
        &self.current_package
    }

    /// Resolve a macro by bare name, or qualified by `package`.
    pub fn get(&self, name: &str, package: Option<&str>) -> Option<&Arc<MacroDef>> {
        match package {
            Some(package) => self.packages.get(package)?.get(name),
            None => self.unqualified.get(name),
        }
    }

    /// Materialization for `(strategy, adapter)`, falling back to the
    /// adapter-agnostic implementation.
    pub fn materialization(&self, strategy: &str, adapter: &str) -> Option<&Arc<MacroDef>> {
        [Some(adapter), None]
            .into_iter()
            .map(|adapter| SymbolKey::materialization(strategy, adapter).source_name())
            .find_map(|name| self.find_anywhere(&name))
    }

    /// Bare name first, then any package in name order.
    fn find_anywhere(&self, name: &str) -> Option<&Arc<MacroDef>> {
        self.unqualified
            .get(name)
            .or_else(|| self.packages.values().find_map(|defs| defs.get(name)))
    }

    pub fn len(&self) -> usize {
        self.packages.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Flatten into template context entries, binding each macro with `bind`.
    ///
    /// Package maps are inserted after bare names and replace a macro that
    /// shares a package's name.
    pub fn to_values<F>(&self, bind: F) -> BTreeMap<String, Value>
    where
        F: Fn(&Arc<MacroDef>) -> Value,
    {
        let mut values: BTreeMap<String, Value> = self
            .unqualified
            .iter()
            .map(|(name, def)| (name.clone(), bind(def)))
            .collect();
        for (package, defs) in &self.packages {
            let members = Value::from_iter(defs.iter().map(|(name, def)| (name.clone(), bind(def))));
            if values.insert(package.clone(), members).is_some() {
                log::warn!("Package name '{package}' hides a macro with the same name");
            }
        }
        values
    }
}

#[cfg(test)]
#[path = "namespace_test.rs"]
mod tests;
