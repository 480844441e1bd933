// Analyzer configuration
//
// Loaded once at startup from TOML; every field has a default so an empty
// file is a valid configuration. The kind table falls back to the embedded
// kinds-default.toml when the configuration brings none.

use crate::classify::{parse_kinds_json, parse_kinds_toml, ComponentKindConfig, PackageManifest};
use crate::error::AnalysisError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_KINDS_TOML: &str = include_str!("../kinds-default.toml");

/// Known package registries used for reused-package attribution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageSources {
    #[serde(default)]
    pub ohpm: Vec<PackageManifest>,

    #[serde(default)]
    pub npm: Vec<PackageManifest>,
}

/// External raw-capture → database converter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Converter executable
    pub program: PathBuf,

    /// Native library search directory passed as `--So_dir`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub so_dir: Option<PathBuf>,

    /// Kill the converter after this many seconds (no limit when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ConverterConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Configuration for one analysis run
///
/// # Example TOML
/// ```toml
/// app_bundle = "com.example.shop"
/// save_callchain = false
///
/// [converter]
/// program = "/opt/tools/trace_streamer_linux"
/// timeout_secs = 600
///
/// [[kind]]
/// name = "ArkWeb"
/// kind = 7
/// [[kind.components]]
/// files = ["/system/lib64/libarkweb_engine.so"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Component kind table
    #[serde(default, rename = "kind")]
    pub kinds: Vec<ComponentKindConfig>,

    #[serde(default)]
    pub packages: PackageSources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<ConverterConfig>,

    /// Restrict samples to the processes of this application bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_bundle: Option<String>,

    /// Dump attributed callchains to CSV for debugging
    #[serde(default)]
    pub save_callchain: bool,

    /// Select one round per step from `<scene>_roundN` folders
    #[serde(default)]
    pub choose_round: bool,

    /// Project metadata (`modules.json`) for the component registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_modules: Option<PathBuf>,
}

impl AnalyzerConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse analyzer configuration")
    }

    /// Load configuration from a TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    /// Kind table embedded in the binary
    pub fn default_kinds() -> Result<Vec<ComponentKindConfig>> {
        parse_kinds_toml(DEFAULT_KINDS_TOML).context("Failed to parse embedded kinds-default.toml")
    }

    /// Use the embedded kind table when none is configured
    pub fn with_default_kinds(mut self) -> Result<Self> {
        if self.kinds.is_empty() {
            self.kinds = Self::default_kinds()?;
        }
        Ok(self)
    }

    /// Append kinds given as a legacy JSON array (e.g. from `--kind-config`)
    pub fn append_kinds_json(&mut self, json: &str) -> Result<usize> {
        let kinds = parse_kinds_json(json)?;
        let count = kinds.len();
        self.kinds.extend(kinds);
        Ok(count)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(converter) = &self.converter {
            if converter.timeout_secs == Some(0) {
                return Err(AnalysisError::Config("converter timeout_secs must be > 0".to_string()));
            }
            if converter.program.as_os_str().is_empty() {
                return Err(AnalysisError::Config("converter program must not be empty".to_string()));
            }
        }

        if let Some(bundle) = &self.app_bundle {
            if bundle.trim().is_empty() {
                return Err(AnalysisError::Config("app_bundle must not be empty".to_string()));
            }
        }

        if let Some(kind) = self.kinds.iter().find(|k| k.name.is_empty()) {
            return Err(AnalysisError::Config(format!(
                "kind with category {} has an empty name",
                kind.kind
            )));
        }

        Ok(())
    }
}
