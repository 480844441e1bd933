//! Scenario folder layout
//!
//! ```text
//! <scene>[_roundN]/
//!     testInfo.json
//!     result/<scene>.xml  (device metadata, optional)
//!     hiperf/
//!         steps.json
//!         step1/perf.data   (raw capture)
//!         step1/perf.db     (converted, created on demand)
//! ```
//!
//! Without round selection the scene folder itself is analyzed. With round
//! selection the scene folder is used when it holds captures, otherwise
//! `<scene>_round0` … `<scene>_round4`.

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_ROUNDS: usize = 5;
pub const REPORT_DIR: &str = "report";
pub const PERF_DATA_FILE: &str = "perf.data";
pub const PERF_DB_FILE: &str = "perf.db";

/// One scripted step (`hiperf/steps.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "stepIdx")]
    pub step_idx: u32,

    #[serde(default)]
    pub description: String,
}

impl StepInfo {
    /// Display name: the description, else the name
    pub fn display_name(&self) -> &str {
        if self.description.is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

/// Application and run metadata (`testInfo.json`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInfo {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub scene: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// Device metadata from the test harness result file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultInfo {
    #[serde(default, rename = "version")]
    pub rom_version: String,
    #[serde(default, rename = "sn")]
    pub device_sn: String,
}

/// Capture and database of one step in one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepArtifacts {
    pub perf_data: PathBuf,
    pub perf_db: PathBuf,
}

impl StepArtifacts {
    pub fn new(round_dir: &Path, step_idx: u32) -> Self {
        let step_dir = round_dir.join("hiperf").join(format!("step{}", step_idx));
        Self {
            perf_data: step_dir.join(PERF_DATA_FILE),
            perf_db: step_dir.join(PERF_DB_FILE),
        }
    }
}

/// Every step directory under `hiperf/` holds a raw capture
///
/// A folder without step directories has no perf data.
pub fn has_perf_data(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir.join("hiperf")) else {
        return false;
    };

    let step_dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.file_name().is_some_and(|n| n != REPORT_DIR))
        .collect();

    !step_dirs.is_empty() && step_dirs.iter().all(|d| d.join(PERF_DATA_FILE).is_file())
}

/// Round folders of a scene, in round order
pub fn discover_rounds(scene_dir: &Path) -> Vec<PathBuf> {
    if has_perf_data(scene_dir) {
        return vec![scene_dir.to_path_buf()];
    }

    let Some(name) = scene_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    (0..MAX_ROUNDS)
        .map(|i| scene_dir.with_file_name(format!("{}_round{}", name, i)))
        .filter(|dir| {
            let usable = has_perf_data(dir);
            if usable {
                tracing::info!("Round folder: {}", dir.display());
            }
            usable
        })
        .collect()
}

/// A resolved scenario ready for analysis
#[derive(Debug, Clone)]
pub struct Scene {
    pub root: PathBuf,
    pub rounds: Vec<PathBuf>,
    pub steps: Vec<StepInfo>,
    pub test_info: TestInfo,
    pub result_info: ResultInfo,
}

impl Scene {
    /// Resolve a scene folder
    ///
    /// Metadata is read from the first round. With `choose_round` false the
    /// scene folder is the only round.
    pub fn load(scene_dir: &Path, choose_round: bool) -> Result<Self> {
        let rounds = if choose_round {
            discover_rounds(scene_dir)
        } else {
            vec![scene_dir.to_path_buf()]
        };
        let first = rounds
            .first()
            .with_context(|| format!("{} has no usable round data", scene_dir.display()))?;

        let steps = load_steps(&first.join("hiperf").join("steps.json"))?;
        let test_info = load_test_info(&first.join("testInfo.json"))?;
        let result_info = scene_dir
            .file_name()
            .map(|name| {
                let xml = first.join("result").join(format!("{}.xml", name.to_string_lossy()));
                load_result_info(&xml)
            })
            .unwrap_or_default();

        Ok(Self {
            root: scene_dir.to_path_buf(),
            rounds,
            steps,
            test_info,
            result_info,
        })
    }

    pub fn artifacts(&self, round: usize, step: &StepInfo) -> Option<StepArtifacts> {
        self.rounds
            .get(round)
            .map(|dir| StepArtifacts::new(dir, step.step_idx))
    }

    /// Scene name from `testInfo.json`, else the folder name
    pub fn name(&self) -> String {
        if !self.test_info.scene.is_empty() {
            return self.test_info.scene.clone();
        }
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Default output folder (`<scene>/report`)
    pub fn report_dir(&self) -> PathBuf {
        self.root.join(REPORT_DIR)
    }
}

pub fn load_steps(path: &Path) -> Result<Vec<StepInfo>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read steps file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse steps file: {}", path.display()))
}

/// `testInfo.json` is optional; missing metadata stays empty
pub fn load_test_info(path: &Path) -> Result<TestInfo> {
    if !path.is_file() {
        tracing::warn!("{} not found, scene metadata left empty", path.display());
        return Ok(TestInfo::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test info: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse test info: {}", path.display()))
}

/// `result/<scene>.xml` is optional; a missing or unreadable file leaves the metadata empty
pub fn load_result_info(path: &Path) -> ResultInfo {
    if !path.is_file() {
        tracing::debug!("{} not found, device metadata left empty", path.display());
        return ResultInfo::default();
    }
    let parsed = fs::read_to_string(path)
        .with_context(|| format!("Failed to read result file: {}", path.display()))
        .and_then(|content| parse_result_xml(&content));
    match parsed {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!("Failed to parse {}: {:#}", path.display(), e);
            ResultInfo::default()
        }
    }
}

/// Device metadata from the `devices` attribute of `<testsuites>`
pub fn parse_result_xml(content: &str) -> Result<ResultInfo> {
    let mut reader = Reader::from_str(content);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"testsuites" => {
                let Some(devices) = e.try_get_attribute("devices")? else {
                    return Ok(ResultInfo::default());
                };
                return parse_devices(&devices.unescape_value()?);
            }
            Event::Eof => anyhow::bail!("no <testsuites> element"),
            _ => {}
        }
    }
}

/// The attribute holds one device as a Python-style dict, optionally in a
/// CDATA section and a list: `[{'sn': '...', 'version': '...'}]`
fn parse_devices(raw: &str) -> Result<ResultInfo> {
    let cdata = Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>")?;
    let unwrapped = cdata.replace_all(raw, "$1");
    let json = unwrapped
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .replace("\\\"", "\"")
        .replace('\'', "\"");
    serde_json::from_str(&json).with_context(|| format!("Invalid devices attribute: {}", raw))
}
