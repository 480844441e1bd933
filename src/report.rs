//! Normalized report object
//!
//! `ReportAssembler` turns the attributed records of each chosen round into
//! one `PerfReport`: per step the chosen round, per-category self/total sums
//! and the category → process → thread → file → symbol tree. Writers
//! (JSON, CSV, SQLite) only ever see this object and `SymbolDetail` rows.

use crate::attribution::{AttributedRecord, Counts, EventType, SampleAggregator};
use crate::category::{category_labels, CategoryLabel, ComponentCategory, OriginKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

/// Flat record with its file/thread/process self sums
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDetail {
    pub step_id: u32,
    pub event_type: EventType,
    pub pid: i64,
    pub process_name: String,
    pub process_events: u64,
    pub tid: i64,
    pub thread_name: String,
    pub thread_events: u64,
    pub file: String,
    pub file_events: u64,
    pub symbol: String,
    pub symbol_events: u64,
    pub symbol_total_events: u64,
    pub component_name: String,
    pub component_category: ComponentCategory,
    pub origin_kind: OriginKind,
}

/// Symbol detail rows of one load, ordered by pid, tid, file, symbol
pub fn symbol_details(aggregator: &SampleAggregator) -> Vec<SymbolDetail> {
    let mut details: Vec<SymbolDetail> = aggregator
        .records()
        .into_iter()
        .map(|r| SymbolDetail {
            step_id: r.step_id,
            event_type: r.event_type,
            pid: r.pid,
            process_name: r.process_name.clone(),
            process_events: aggregator.process_counts(r.event_type, r.step_id, r.pid).self_count,
            tid: r.tid,
            thread_name: r.thread_name.clone(),
            thread_events: aggregator.thread_counts(r.event_type, r.step_id, r.tid).self_count,
            file: r.file.clone(),
            file_events: aggregator
                .file_counts(r.event_type, r.step_id, r.tid, &r.file)
                .self_count,
            symbol: r.symbol.clone(),
            symbol_events: r.self_count,
            symbol_total_events: r.total_count,
            component_name: r.subcategory_name.clone().unwrap_or_default(),
            component_category: r.category,
            origin_kind: r.origin_kind,
        })
        .collect();

    details.sort_by(|a, b| {
        (a.pid, a.tid, &a.file, &a.symbol, a.event_type)
            .cmp(&(b.pid, b.tid, &b.file, &b.symbol, b.event_type))
    });
    details
}

/// SHA-256 (hex) over the bytes of the given files, in order
pub fn perf_id<P: AsRef<Path>>(paths: &[P]) -> io::Result<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        let mut file = File::open(path.as_ref())?;
        io::copy(&mut file, &mut hasher)?;
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Per-category sums of one step and event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: ComponentCategory,
    pub name: String,
    pub self_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub symbol: String,
    pub self_count: u64,
    pub total_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub origin_kind: OriginKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub file: String,
    pub self_count: u64,
    pub total_count: u64,
    pub symbols: Vec<SymbolNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub tid: i64,
    pub name: String,
    pub self_count: u64,
    pub total_count: u64,
    pub files: Vec<FileNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessNode {
    pub pid: i64,
    pub name: String,
    pub self_count: u64,
    pub total_count: u64,
    pub threads: Vec<ThreadNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub category: ComponentCategory,
    pub name: String,
    pub self_count: u64,
    pub total_count: u64,
    pub processes: Vec<ProcessNode>,
}

/// Breakdown of one event type within a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBreakdown {
    pub event_type: EventType,
    pub self_count: u64,
    pub total_count: u64,
    /// One entry per category label, in label order
    pub categories: Vec<CategorySummary>,
    pub tree: Vec<CategoryNode>,
}

/// Result of one scenario step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: u32,
    pub step_name: String,
    /// Chosen round, `None` when the step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<usize>,
    /// Round selection scalar of the chosen round
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf_data_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events: Vec<EventBreakdown>,
}

impl StepReport {
    pub fn is_failed(&self) -> bool {
        self.round.is_none()
    }

    pub fn event(&self, event_type: EventType) -> Option<&EventBreakdown> {
        self.events.iter().find(|e| e.event_type == event_type)
    }
}

/// Whole-run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfReport {
    pub perf_id: String,
    pub perf_path: Vec<String>,
    pub scene: String,
    pub app_id: String,
    pub app_version: String,
    pub os_version: String,
    /// Capture start from `testInfo.json`
    pub timestamp: i64,
    pub categories: Vec<CategoryLabel>,
    pub steps: Vec<StepReport>,
}

/// Per-step summary line (`summary_info.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryInfo {
    pub rom_version: String,
    pub app_version: String,
    pub scene: String,
    pub step_name: String,
    pub step_id: u32,
    pub count: u64,
}

/// Where a chosen round's data came from
#[derive(Debug, Clone)]
pub struct ChosenRound {
    pub round: usize,
    pub count: u64,
    pub perf_data_path: String,
}

/// Collects step results in scenario order
#[derive(Debug, Default)]
pub struct ReportAssembler {
    steps: Vec<StepReport>,
}

impl ReportAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step attributed from its chosen round
    pub fn add_step(&mut self, step_id: u32, step_name: &str, chosen: ChosenRound, records: &[AttributedRecord]) {
        let events = [EventType::Cycles, EventType::Instructions]
            .into_iter()
            .map(|event_type| breakdown(event_type, records.iter().filter(|r| r.event_type == event_type)))
            .collect();

        self.steps.push(StepReport {
            step_id,
            step_name: step_name.to_string(),
            round: Some(chosen.round),
            count: chosen.count,
            perf_data_path: Some(chosen.perf_data_path),
            error: None,
            events,
        });
    }

    /// Add a step that produced no usable round; it reports zero everywhere
    pub fn add_failed_step(&mut self, step_id: u32, step_name: &str, reason: &str) {
        let events = [EventType::Cycles, EventType::Instructions]
            .into_iter()
            .map(|event_type| breakdown(event_type, std::iter::empty()))
            .collect();

        self.steps.push(StepReport {
            step_id,
            step_name: step_name.to_string(),
            round: None,
            count: 0,
            perf_data_path: None,
            error: Some(reason.to_string()),
            events,
        });
    }

    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.is_failed()).count()
    }

    pub fn finish(self, header: ReportHeader) -> PerfReport {
        PerfReport {
            perf_id: header.perf_id,
            perf_path: header.perf_path,
            scene: header.scene,
            app_id: header.app_id,
            app_version: header.app_version,
            os_version: header.os_version,
            timestamp: header.timestamp,
            categories: category_labels(),
            steps: self.steps,
        }
    }
}

/// Run identity placed at the top of the report
#[derive(Debug, Clone, Default)]
pub struct ReportHeader {
    pub perf_id: String,
    pub perf_path: Vec<String>,
    pub scene: String,
    pub app_id: String,
    pub app_version: String,
    pub os_version: String,
    pub timestamp: i64,
}

type SymbolMap<'a> = BTreeMap<&'a str, &'a AttributedRecord>;
type FileMap<'a> = BTreeMap<&'a str, (Counts, SymbolMap<'a>)>;
type ThreadMap<'a> = BTreeMap<i64, (Counts, &'a str, FileMap<'a>)>;
type ProcessMap<'a> = BTreeMap<i64, (Counts, &'a str, ThreadMap<'a>)>;

fn breakdown<'a>(
    event_type: EventType,
    records: impl Iterator<Item = &'a AttributedRecord>,
) -> EventBreakdown {
    let mut by_category: BTreeMap<ComponentCategory, (Counts, ProcessMap<'a>)> = BTreeMap::new();

    for r in records {
        let counts = r.counts();
        let (category_counts, processes) = by_category.entry(r.category).or_default();
        *category_counts += counts;

        let (process_counts, _, threads) = processes
            .entry(r.pid)
            .or_insert_with(|| (Counts::default(), r.process_name.as_str(), BTreeMap::new()));
        *process_counts += counts;

        let (thread_counts, _, files) = threads
            .entry(r.tid)
            .or_insert_with(|| (Counts::default(), r.thread_name.as_str(), BTreeMap::new()));
        *thread_counts += counts;

        let (file_counts, symbols) = files.entry(r.file.as_str()).or_default();
        *file_counts += counts;
        symbols.insert(r.symbol.as_str(), r);
    }

    let categories = ComponentCategory::ALL
        .iter()
        .map(|&category| {
            let counts = by_category.get(&category).map(|(c, _)| *c).unwrap_or_default();
            CategorySummary {
                category,
                name: category.name().to_string(),
                self_count: counts.self_count,
                total_count: counts.total_count,
            }
        })
        .collect::<Vec<_>>();

    let self_count = categories.iter().map(|c| c.self_count).sum();
    let total_count = categories.iter().map(|c| c.total_count).sum();

    let mut tree: Vec<CategoryNode> = by_category
        .into_iter()
        .map(|(category, (counts, processes))| CategoryNode {
            category,
            name: category.name().to_string(),
            self_count: counts.self_count,
            total_count: counts.total_count,
            processes: process_nodes(processes),
        })
        .collect();
    sort_by_load(&mut tree, |n| (n.self_count, n.total_count));

    EventBreakdown {
        event_type,
        self_count,
        total_count,
        categories,
        tree,
    }
}

fn process_nodes(processes: ProcessMap<'_>) -> Vec<ProcessNode> {
    let mut nodes: Vec<ProcessNode> = processes
        .into_iter()
        .map(|(pid, (counts, name, threads))| ProcessNode {
            pid,
            name: name.to_string(),
            self_count: counts.self_count,
            total_count: counts.total_count,
            threads: thread_nodes(threads),
        })
        .collect();
    sort_by_load(&mut nodes, |n| (n.self_count, n.total_count));
    nodes
}

fn thread_nodes(threads: ThreadMap<'_>) -> Vec<ThreadNode> {
    let mut nodes: Vec<ThreadNode> = threads
        .into_iter()
        .map(|(tid, (counts, name, files))| ThreadNode {
            tid,
            name: name.to_string(),
            self_count: counts.self_count,
            total_count: counts.total_count,
            files: file_nodes(files),
        })
        .collect();
    sort_by_load(&mut nodes, |n| (n.self_count, n.total_count));
    nodes
}

fn file_nodes(files: FileMap<'_>) -> Vec<FileNode> {
    let mut nodes: Vec<FileNode> = files
        .into_iter()
        .map(|(file, (counts, symbols))| {
            let mut symbols: Vec<SymbolNode> = symbols
                .into_values()
                .map(|r| SymbolNode {
                    symbol: r.symbol.clone(),
                    self_count: r.self_count,
                    total_count: r.total_count,
                    subcategory: r.subcategory_name.clone(),
                    origin_kind: r.origin_kind,
                })
                .collect();
            sort_by_load(&mut symbols, |n| (n.self_count, n.total_count));
            FileNode {
                file: file.to_string(),
                self_count: counts.self_count,
                total_count: counts.total_count,
                symbols,
            }
        })
        .collect();
    sort_by_load(&mut nodes, |n| (n.self_count, n.total_count));
    nodes
}

/// Heaviest first; the stable sort keeps key order for equal loads
fn sort_by_load<T>(nodes: &mut [T], load: impl Fn(&T) -> (u64, u64)) {
    nodes.sort_by(|a, b| load(b).cmp(&load(a)));
}
