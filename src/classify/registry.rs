use crate::category::{ComponentCategory, OriginKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// File manifest of a package published on a known registry (ohpm, npm)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackageManifest {
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub versions: Vec<String>,

    /// Module paths shipped by the package, without extension
    #[serde(default)]
    pub files: Vec<String>,
}

/// Component declared by the project metadata (`modules.json`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectComponent {
    pub name: String,

    pub kind: ComponentCategory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub files: Vec<String>,

    /// Master component of the application
    #[serde(default)]
    pub main: bool,
}

#[derive(Deserialize)]
struct ProjectModule {
    #[serde(default)]
    components: Vec<ProjectComponent>,
}

/// A component known by package name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredComponent {
    pub name: String,
    pub category: ComponentCategory,
    pub origin_kind: OriginKind,
    pub version: Option<String>,
}

/// Package name → component lookup used to reclassify bytecode symbols
///
/// Lets the same package bundled by different apps map to one logical component.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: HashMap<String, RegisteredComponent>,
    packages: HashMap<String, HashSet<String>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register registry packages as reused libraries
    pub fn add_packages<I: IntoIterator<Item = PackageManifest>>(&mut self, packages: I) {
        for package in packages {
            self.components
                .entry(package.name.clone())
                .or_insert_with(|| RegisteredComponent {
                    name: package.name.clone(),
                    category: ComponentCategory::AppLib,
                    origin_kind: OriginKind::OpenSource,
                    version: (!package.version.is_empty()).then(|| package.version.clone()),
                });
            self.packages
                .entry(package.name)
                .or_default()
                .extend(package.files);
        }
    }

    /// Whether more than half of the component's files belong to a registry package of the same name
    pub fn is_reused_package(&self, component: &ProjectComponent) -> bool {
        let Some(manifest) = self.packages.get(&component.name) else {
            return false;
        };
        let files: HashSet<&String> = component.files.iter().collect();
        if files.is_empty() {
            return false;
        }

        let matched = files.iter().filter(|f| manifest.contains(f.as_str())).count();
        matched as f64 / files.len() as f64 > 0.5
    }

    /// Register a project component, overriding any registry-only entry
    pub fn register_project_component(&mut self, component: ProjectComponent) {
        let (category, origin_kind) = if self.is_reused_package(&component) {
            (ComponentCategory::AppLib, OriginKind::OpenSource)
        } else {
            (component.kind, OriginKind::FirstParty)
        };

        self.components.insert(
            component.name.clone(),
            RegisteredComponent {
                name: component.name,
                category,
                origin_kind,
                version: component.version,
            },
        );
    }

    /// Register every component of a `modules.json` document
    pub fn add_project_modules_json(&mut self, content: &str) -> Result<usize> {
        let modules: Vec<ProjectModule> =
            serde_json::from_str(content).context("Failed to parse project modules")?;

        let mut count = 0;
        for component in modules.into_iter().flat_map(|m| m.components) {
            self.register_project_component(component);
            count += 1;
        }
        Ok(count)
    }

    /// Load project metadata from a `modules.json` file
    pub fn load_project_modules<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read project modules: {}", path.as_ref().display())
        })?;
        self.add_project_modules_json(&content)
    }

    pub fn get(&self, package: &str) -> Option<&RegisteredComponent> {
        self.components.get(package)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str, files: &[&str]) -> PackageManifest {
        PackageManifest {
            name: name.to_string(),
            version: "2.0.1".to_string(),
            versions: vec!["2.0.1".to_string()],
            files: files.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_registry_package_is_app_lib() {
        let mut registry = ComponentRegistry::new();
        registry.add_packages([manifest("@ohos/lottie", &["src/main/js/Lottie"])]);

        let c = registry.get("@ohos/lottie").unwrap();
        assert_eq!(c.category, ComponentCategory::AppLib);
        assert_eq!(c.origin_kind, OriginKind::OpenSource);
        assert_eq!(c.version.as_deref(), Some("2.0.1"));
    }

    #[test]
    fn test_project_component_reuse_threshold() {
        let mut registry = ComponentRegistry::new();
        registry.add_packages([manifest("axios", &["lib/core", "lib/http", "index"])]);

        let reused = ProjectComponent {
            name: "axios".to_string(),
            kind: ComponentCategory::AppAbc,
            version: None,
            files: vec!["lib/core".to_string(), "lib/http".to_string(), "patched".to_string()],
            main: false,
        };
        assert!(registry.is_reused_package(&reused));

        let forked = ProjectComponent {
            files: vec!["lib/core".to_string(), "a".to_string(), "b".to_string()],
            ..reused.clone()
        };
        assert!(!registry.is_reused_package(&forked));

        registry.register_project_component(forked);
        let c = registry.get("axios").unwrap();
        assert_eq!(c.category, ComponentCategory::AppAbc);
        assert_eq!(c.origin_kind, OriginKind::FirstParty);
    }

    #[test]
    fn test_modules_json() {
        let mut registry = ComponentRegistry::new();
        let count = registry
            .add_project_modules_json(
                r#"[{"components": [
                    {"name": "entry", "kind": 0, "main": true},
                    {"name": "libnative", "kind": 1, "files": ["libnative.so"]}
                ]}, {"components": []}]"#,
            )
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("libnative").unwrap().category, ComponentCategory::AppSo);
        assert!(registry.get("missing").is_none());
    }
}
