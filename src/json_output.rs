//! JSON report and summary output

use crate::report::{PerfReport, SummaryInfo};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const REPORT_FILE: &str = "report.json";
pub const SUMMARY_FILE: &str = "summary_info.json";

/// Root JSON output structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    #[serde(flatten)]
    pub report: PerfReport,
}

impl JsonOutput {
    pub fn new(report: PerfReport) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "loadscope-report-v1".to_string(),
            report,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `summary_info.json`: one entry per attributed step
pub fn summary_to_json(summaries: &[SummaryInfo]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(summaries)?)
}

/// Write `report.json` and `summary_info.json` into `dir`
pub fn write_json(dir: &Path, report: &PerfReport, summaries: &[SummaryInfo]) -> anyhow::Result<()> {
    use anyhow::Context;

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let report_path = dir.join(REPORT_FILE);
    fs::write(&report_path, JsonOutput::new(report.clone()).to_json()?)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    let summary_path = dir.join(SUMMARY_FILE);
    fs::write(&summary_path, summary_to_json(summaries)?)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    tracing::info!("Wrote {} and {}", report_path.display(), summary_path.display());
    Ok(())
}
