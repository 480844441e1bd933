//! One database load cycle
//!
//! `PerfAnalyzer::load` reads threads, files, symbols and callchains from a
//! row source, classifies every file and bytecode symbol once, disassembles
//! every callchain once, resolves the step windows and then charges each
//! sample. All per-load state is cleared at the start of the next load; only
//! the shared `ClassificationContext` outlives it.

use crate::attribution::{
    AttributedRecord, CallFrame, Callchain, IngestOutcome, SampleAggregator, ThreadTable,
};
use crate::category::FileClassification;
use crate::classify::{ClassificationContext, SymbolReclassifier, SymbolTable};
use crate::error::Result;
use crate::row_source::RowSource;
use crate::step_window::{resolve_step_windows, step_for_timestamp, StepWindow};
use fnv::{FnvHashMap, FnvHashSet};
use serde::Serialize;
use std::collections::HashSet;

/// What happened to the samples of one load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub samples: usize,
    pub attributed: usize,
    pub outside_window: usize,
    pub ignored: usize,
    /// Samples of the idle thread (tid 0), skipped
    pub idle: usize,
    /// Samples whose callchain was never loaded
    pub unknown_callchains: usize,
}

/// Load marker of a frame in the callchain dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLoad {
    SelfEvent,
    TotalEvent,
    Unmarked,
}

impl FrameLoad {
    pub fn label(self) -> &'static str {
        match self {
            FrameLoad::SelfEvent => "Self",
            FrameLoad::TotalEvent => "Total",
            FrameLoad::Unmarked => "",
        }
    }
}

/// One frame of an attributed callchain, for debugging dumps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallchainDumpRow {
    pub callchain_id: i64,
    pub depth: i64,
    pub file: String,
    pub symbol: String,
    pub classification: FileClassification,
    pub load: FrameLoad,
}

pub struct PerfAnalyzer<'a> {
    ctx: &'a ClassificationContext,
    threads: ThreadTable,
    files: FnvHashMap<i64, FileClassification>,
    symbols: SymbolTable,
    reclassifier: SymbolReclassifier,
    callchains: FnvHashMap<i64, Callchain>,
    /// Callchains referenced by ingested samples
    referenced: FnvHashSet<i64>,
    windows: Vec<StepWindow>,
    aggregator: SampleAggregator,
}

impl<'a> PerfAnalyzer<'a> {
    pub fn new(ctx: &'a ClassificationContext) -> Self {
        Self {
            ctx,
            threads: ThreadTable::new(),
            files: FnvHashMap::default(),
            symbols: SymbolTable::new(),
            reclassifier: SymbolReclassifier::new(),
            callchains: FnvHashMap::default(),
            referenced: FnvHashSet::default(),
            windows: Vec::new(),
            aggregator: SampleAggregator::new(),
        }
    }

    /// Drop every per-load cache and result
    pub fn clear(&mut self) {
        self.threads.clear();
        self.files.clear();
        self.symbols.clear();
        self.reclassifier.clear();
        self.callchains.clear();
        self.referenced.clear();
        self.windows.clear();
        self.aggregator.clear();
    }

    /// Load one database and attribute its samples to `group_id`
    pub fn load<S: RowSource + ?Sized>(&mut self, source: &S, group_id: u32) -> Result<LoadStats> {
        self.clear();

        self.load_threads(source)?;
        self.load_files(source)?;
        self.load_symbols(source)?;
        self.load_callchains(source)?;

        let markers = source.timeline_markers()?;
        let range = source.sample_time_range()?;
        self.windows = resolve_step_windows(&markers, group_id, range);

        let stats = self.ingest_samples(source)?;
        tracing::info!(
            "Step {}: {} samples, {} attributed, {} outside step windows, {} idle",
            group_id,
            stats.samples,
            stats.attributed,
            stats.outside_window,
            stats.idle
        );
        Ok(stats)
    }

    fn load_threads<S: RowSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        for row in source.threads()? {
            self.threads
                .insert(row.thread_id, row.process_id, row.name.as_deref(), &self.ctx.rules);
        }
        tracing::debug!("Loaded {} threads", self.threads.len());
        Ok(())
    }

    fn load_files<S: RowSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        self.files.insert(-1, FileClassification::unknown());
        for row in source.files()? {
            let classification = self.ctx.rules.classify_file(&row.path);
            self.files.entry(row.file_id).or_insert(classification);
        }
        tracing::debug!("Classified {} files", self.files.len());
        Ok(())
    }

    fn load_symbols<S: RowSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        for row in source.symbols()? {
            self.symbols.insert(row.symbol_id, row.text);
        }
        Ok(())
    }

    fn load_callchains<S: RowSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        let mut frames: FnvHashMap<i64, Vec<CallFrame>> = FnvHashMap::default();

        for row in source.callchain_frames()? {
            let file_classification = match self.files.get(&row.file_id) {
                Some(c) => c,
                None => {
                    tracing::debug!("File {} not in capture, classified UNKNOWN", row.file_id);
                    self.files.entry(row.file_id).or_insert_with(FileClassification::unknown)
                }
            };
            let classification = self.reclassifier.classify_symbol(
                row.symbol_id,
                file_classification,
                &mut self.symbols,
                self.ctx.rules.symbol_meta(),
                &self.ctx.registry,
            );

            frames.entry(row.callchain_id).or_default().push(CallFrame {
                depth: row.depth,
                file_id: row.file_id,
                symbol_id: row.symbol_id,
                classification,
            });
        }

        self.callchains = frames
            .into_iter()
            .map(|(id, frames)| (id, Callchain::new(id, frames)))
            .collect();
        tracing::debug!("Disassembled {} callchains", self.callchains.len());
        Ok(())
    }

    fn ingest_samples<S: RowSource + ?Sized>(&mut self, source: &S) -> Result<LoadStats> {
        let mut stats = LoadStats::default();
        let mut dropped_events: HashSet<String> = HashSet::new();

        for sample in source.samples()? {
            stats.samples += 1;
            self.referenced.insert(sample.callchain_id);
            if sample.thread_id == 0 {
                stats.idle += 1;
                continue;
            }

            if !self.callchains.contains_key(&sample.callchain_id) {
                tracing::debug!(
                    "Sample {} references unknown callchain {}",
                    sample.id,
                    sample.callchain_id
                );
                stats.unknown_callchains += 1;
                self.callchains
                    .insert(sample.callchain_id, Callchain::placeholder(sample.callchain_id));
            }
            let Some(callchain) = self.callchains.get(&sample.callchain_id) else {
                continue;
            };

            let step = step_for_timestamp(&self.windows, sample.timestamp);
            match self
                .aggregator
                .ingest(&sample, step, callchain, &mut self.threads, &self.symbols)
            {
                IngestOutcome::Attributed => stats.attributed += 1,
                IngestOutcome::OutsideWindow => stats.outside_window += 1,
                IngestOutcome::Ignored => {
                    stats.ignored += 1;
                    if dropped_events.insert(sample.event_name.clone()) {
                        tracing::debug!("Dropping unsupported event {}", sample.event_name);
                    }
                }
            }
        }

        Ok(stats)
    }

    pub fn aggregator(&self) -> &SampleAggregator {
        &self.aggregator
    }

    pub fn records(&self) -> Vec<&AttributedRecord> {
        self.aggregator.records()
    }

    pub fn windows(&self) -> &[StepWindow] {
        &self.windows
    }

    pub fn callchain(&self, id: i64) -> Option<&Callchain> {
        self.callchains.get(&id)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Frames of every callchain referenced by a sample, with their load marker
    pub fn callchain_dump(&self) -> Vec<CallchainDumpRow> {
        let mut ids: Vec<i64> = self
            .referenced
            .iter()
            .copied()
            .filter(|id| self.callchains.contains_key(id))
            .collect();
        ids.sort_unstable();

        let mut rows = Vec::new();
        for id in ids {
            let Some(chain) = self.callchains.get(&id) else {
                continue;
            };
            for (i, frame) in chain.frames().iter().enumerate() {
                let load = if i == chain.self_index() {
                    FrameLoad::SelfEvent
                } else if chain.total_indices().contains(&i) {
                    FrameLoad::TotalEvent
                } else {
                    FrameLoad::Unmarked
                };
                rows.push(CallchainDumpRow {
                    callchain_id: id,
                    depth: frame.depth,
                    file: frame.classification.file.clone(),
                    symbol: self.symbols.name(frame.symbol_id).to_string(),
                    classification: frame.classification.clone(),
                    load,
                });
            }
        }
        rows
    }
}
