use crate::category::{ComponentCategory, OriginKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One configured component kind and the file/thread patterns that select it
///
/// # Example TOML
/// ```toml
/// [[kind]]
/// name = "ArkUI"
/// kind = 3
///
/// [[kind.components]]
/// name = "ace"
/// files = ["/system/lib64/libace_compatible.z.so", "/system/lib64/module/.*\\.so$"]
/// threads = ["^VSyncGenerator$"]
/// ```
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ComponentKindConfig {
    /// Component name, reported as the category name of matching files
    pub name: String,

    /// Numeric category id (see `ComponentCategory`)
    pub kind: ComponentCategory,

    #[serde(default)]
    pub components: Vec<SubComponentConfig>,
}

/// Sub-component with its file, pattern and thread selectors
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SubComponentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Legacy selectors: a regex iff `is_regex_pattern` says so, otherwise an exact path
    #[serde(default)]
    pub files: Vec<String>,

    /// Selectors that are always regular expressions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,

    /// Thread name regular expressions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threads: Vec<String>,

    #[serde(default)]
    pub origin: OriginKind,
}

/// Character sniffing used to tell a legacy regex selector from a literal path
///
/// Literal dots are not detected, so `libfoo.so` stays an exact path.
pub fn is_regex_pattern(selector: &str) -> bool {
    selector.contains('$')
        || selector.contains("d+")
        || selector.contains(".*")
        || selector.contains(".+")
}

#[derive(Deserialize)]
struct KindFile {
    #[serde(default)]
    kind: Vec<ComponentKindConfig>,
}

/// Parse kinds from TOML (`[[kind]]` tables)
pub fn parse_kinds_toml(content: &str) -> Result<Vec<ComponentKindConfig>> {
    let file: KindFile =
        toml::from_str(content).context("Failed to parse TOML kind definitions")?;
    Ok(file.kind)
}

/// Parse kinds from the legacy JSON array form
pub fn parse_kinds_json(content: &str) -> Result<Vec<ComponentKindConfig>> {
    serde_json::from_str(content).context("Failed to parse JSON kind definitions")
}

/// Load kinds from a `.toml` or `.json` file
pub fn load_kinds<P: AsRef<Path>>(path: P) -> Result<Vec<ComponentKindConfig>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read kind file: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_kinds_json(&content),
        _ => parse_kinds_toml(&content),
    }
}
