//! CLI argument parsing for loadscope

use crate::config::{AnalyzerConfig, ConverterConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the attribution report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON report tree and summary (default)
    Json,
    /// CSV symbol detail rows
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "loadscope")]
#[command(version)]
#[command(about = "Attribute sampled CPU load of scenario captures to software components", long_about = None)]
pub struct Cli {
    /// Scenario folder (`<scene>` holding `hiperf/` and `testInfo.json`)
    #[arg(short = 'i', long = "input", value_name = "DIR")]
    pub input: PathBuf,

    /// Output folder (default: `<scene>/report`)
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Analyzer configuration file (TOML)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Extra component kinds as a JSON array, appended to the configured kinds
    #[arg(long = "kind-config", value_name = "JSON")]
    pub kind_config: Option<String>,

    /// Native library search folder passed to the converter
    #[arg(long = "so-dir", value_name = "DIR")]
    pub so_dir: Option<PathBuf>,

    /// Capture converter binary (enables conversion of raw captures)
    #[arg(long = "converter", value_name = "PROGRAM")]
    pub converter: Option<PathBuf>,

    /// Converter timeout in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Only analyze the processes of this application bundle
    #[arg(long = "app", value_name = "BUNDLE")]
    pub app: Option<String>,

    /// Choose a representative round from `<scene>_roundN` folders
    #[arg(long = "choose")]
    pub choose: bool,

    /// Dump attributed callchains to CSV
    #[arg(long = "save-callchain")]
    pub save_callchain: bool,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Layer command-line options over a loaded configuration
    pub fn apply_to(&self, config: &mut AnalyzerConfig) -> anyhow::Result<()> {
        if let Some(json) = &self.kind_config {
            let added = config.append_kinds_json(json)?;
            tracing::debug!("Appended {} kinds from --kind-config", added);
        }

        if let Some(program) = &self.converter {
            let previous = config.converter.take();
            config.converter = Some(ConverterConfig {
                program: program.clone(),
                so_dir: previous.as_ref().and_then(|c| c.so_dir.clone()),
                timeout_secs: previous.and_then(|c| c.timeout_secs),
            });
        }
        match config.converter.as_mut() {
            Some(converter) => {
                if self.so_dir.is_some() {
                    converter.so_dir = self.so_dir.clone();
                }
                if self.timeout.is_some() {
                    converter.timeout_secs = self.timeout;
                }
            }
            None if self.so_dir.is_some() || self.timeout.is_some() => {
                tracing::warn!("--so-dir and --timeout have no effect without a converter");
            }
            None => {}
        }

        if self.app.is_some() {
            config.app_bundle = self.app.clone();
        }
        config.choose_round |= self.choose;
        config.save_callchain |= self.save_callchain;
        Ok(())
    }
}
