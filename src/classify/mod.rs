// Configuration-driven component classification
//
// Turns file paths, thread names and bytecode symbols into a
// (category, subcategory, origin) triple. Rule tables are compiled once per
// run and shared read-only by every database load through
// `ClassificationContext`; per-load caches live with the analyzer.
//
// Resolution order for files: exact path, regex, app bundle heuristic,
// basename, SYS_SDK fallback. Classification is total: every input ends in a
// classification, there is no error path.

mod config;
mod registry;
mod rules;
mod symbol;

pub use config::{
    is_regex_pattern, load_kinds, parse_kinds_json, parse_kinds_toml, ComponentKindConfig,
    SubComponentConfig,
};
pub use registry::{ComponentRegistry, PackageManifest, ProjectComponent, RegisteredComponent};
pub use rules::ClassificationRules;
pub use symbol::{EmbeddedSymbolMeta, SymbolMetaParser, SymbolReclassifier, SymbolTable};

use crate::config::AnalyzerConfig;
use anyhow::Result;

/// Immutable classification state for one analysis run
#[derive(Debug)]
pub struct ClassificationContext {
    pub rules: ClassificationRules,
    pub registry: ComponentRegistry,
}

impl ClassificationContext {
    pub fn new(rules: ClassificationRules, registry: ComponentRegistry) -> Self {
        Self { rules, registry }
    }

    /// Compile rules and load the component registry from configuration
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let rules = ClassificationRules::from_kinds(&config.kinds)?;

        let mut registry = ComponentRegistry::new();
        registry.add_packages(config.packages.ohpm.iter().cloned());
        registry.add_packages(config.packages.npm.iter().cloned());
        if let Some(modules) = &config.project_modules {
            let count = registry.load_project_modules(modules)?;
            tracing::info!("Loaded {} project components from {}", count, modules.display());
        }

        tracing::debug!(
            "Classification context: {} rules, {} registered components",
            rules.rule_count(),
            registry.len()
        );
        Ok(Self::new(rules, registry))
    }
}
