use super::callchain::{CallFrame, Callchain};
use super::thread::{PerfThread, ThreadTable};
use crate::category::{basename, ComponentCategory, OriginKind};
use crate::classify::SymbolTable;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hardware event aliases counted as cycles
pub const CYCLES_EVENTS: [&str; 3] = ["hw-cpu-cycles", "cpu-cycles", "raw-cpu-cycles"];

/// Hardware event aliases counted as retired instructions
pub const INSTRUCTION_EVENTS: [&str; 3] =
    ["hw-instructions", "instructions", "raw-instruction-retired"];

/// Sampled hardware event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Cycles,
    Instructions,
}

impl EventType {
    /// Event type of a raw event name; `None` for unsupported events
    pub fn from_event_name(name: &str) -> Option<Self> {
        if CYCLES_EVENTS.contains(&name) {
            Some(EventType::Cycles)
        } else if INSTRUCTION_EVENTS.contains(&name) {
            Some(EventType::Instructions)
        } else {
            None
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            EventType::Cycles => &CYCLES_EVENTS,
            EventType::Instructions => &INSTRUCTION_EVENTS,
        }
    }

    /// Label stored in the report database
    pub fn label(self) -> &'static str {
        match self {
            EventType::Cycles => "CYCLES_EVENT",
            EventType::Instructions => "INSTRUCTION_EVENT",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Cycles => f.write_str("cycles"),
            EventType::Instructions => f.write_str("instructions"),
        }
    }
}

/// One hardware event sample as read from a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRow {
    pub id: i64,
    pub callchain_id: i64,
    pub timestamp: i64,
    pub thread_id: i64,
    pub event_count: u64,
    pub event_name: String,
}

/// Self/total event counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub self_count: u64,
    pub total_count: u64,
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, other: Counts) {
        self.self_count += other.self_count;
        self.total_count += other.total_count;
    }
}

/// Identity of an attributed record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub event_type: EventType,
    pub step_id: u32,
    pub tid: i64,
    pub file: String,
    pub symbol: String,
}

/// Load of one (event, step, thread, file, symbol) combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedRecord {
    pub step_id: u32,
    pub event_type: EventType,
    pub pid: i64,
    pub process_name: String,
    pub tid: i64,
    pub thread_name: String,
    pub file: String,
    pub symbol: String,
    pub self_count: u64,
    pub total_count: u64,
    pub category: ComponentCategory,
    pub category_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_name: Option<String>,
    pub origin_kind: OriginKind,
}

impl AttributedRecord {
    pub fn counts(&self) -> Counts {
        Counts {
            self_count: self.self_count,
            total_count: self.total_count,
        }
    }
}

/// Where a sample went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Charged to a step
    Attributed,
    /// Counted only in the whole-run totals
    OutsideWindow,
    /// Event not supported
    Ignored,
}

type FileKey = (EventType, u32, i64, String);
type ThreadKey = (EventType, u32, i64);

/// Accumulates attributed records and their file/thread/process rollups
///
/// Every charge updates the record and all three rollups in the same call,
/// so rollup sums always equal the sums of the records they cover.
#[derive(Debug, Default)]
pub struct SampleAggregator {
    records: FnvHashMap<RecordKey, AttributedRecord>,
    files: FnvHashMap<FileKey, Counts>,
    threads: FnvHashMap<ThreadKey, Counts>,
    processes: FnvHashMap<ThreadKey, Counts>,
    run_totals: BTreeMap<EventType, u64>,
}

impl SampleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge one sample
    ///
    /// The self frame receives the sample as self load, every total frame as
    /// total load. An empty chain charges self load to the UNKNOWN frame.
    pub fn ingest(
        &mut self,
        sample: &SampleRow,
        step_id: Option<u32>,
        callchain: &Callchain,
        threads: &mut ThreadTable,
        symbols: &SymbolTable,
    ) -> IngestOutcome {
        let Some(event_type) = EventType::from_event_name(&sample.event_name) else {
            return IngestOutcome::Ignored;
        };
        *self.run_totals.entry(event_type).or_default() += sample.event_count;

        let Some(step_id) = step_id else {
            return IngestOutcome::OutsideWindow;
        };

        let (thread, process) = threads.resolve(sample.thread_id);
        let unknown = CallFrame::unknown();
        let self_frame = callchain.self_frame().unwrap_or(&unknown);

        let target = ChargeTarget {
            event_type,
            step_id,
            thread,
            process,
            symbols,
        };

        self.charge(
            &target,
            self_frame,
            Counts {
                self_count: sample.event_count,
                total_count: 0,
            },
        );
        for frame in callchain.total_frames() {
            self.charge(
                &target,
                frame,
                Counts {
                    self_count: 0,
                    total_count: sample.event_count,
                },
            );
        }

        IngestOutcome::Attributed
    }

    fn charge(&mut self, target: &ChargeTarget<'_>, frame: &CallFrame, counts: Counts) {
        let thread = target.thread;
        let process = target.process;
        let file = &frame.classification.file;
        let symbol = target.symbols.name(frame.symbol_id);

        let key = RecordKey {
            event_type: target.event_type,
            step_id: target.step_id,
            tid: thread.thread_id,
            file: file.clone(),
            symbol: symbol.to_string(),
        };

        let record = self.records.entry(key).or_insert_with(|| {
            let (category, category_name, subcategory_name) = match &thread.classification {
                // thread rules override the frame classification
                Some(tc) => (
                    tc.category,
                    tc.category_name.clone(),
                    tc.subcategory_name
                        .clone()
                        .or_else(|| Some(basename(file).to_string())),
                ),
                None => (
                    frame.classification.category,
                    frame.classification.category_name.clone(),
                    frame.classification.subcategory_name.clone(),
                ),
            };
            AttributedRecord {
                step_id: target.step_id,
                event_type: target.event_type,
                pid: process.thread_id,
                process_name: process.name.clone(),
                tid: thread.thread_id,
                thread_name: thread.name.clone(),
                file: file.clone(),
                symbol: symbol.to_string(),
                self_count: 0,
                total_count: 0,
                category,
                category_name,
                subcategory_name,
                origin_kind: frame.classification.origin_kind,
            }
        });
        record.self_count += counts.self_count;
        record.total_count += counts.total_count;

        *self
            .files
            .entry((target.event_type, target.step_id, thread.thread_id, file.clone()))
            .or_default() += counts;
        *self
            .threads
            .entry((target.event_type, target.step_id, thread.thread_id))
            .or_default() += counts;
        *self
            .processes
            .entry((target.event_type, target.step_id, process.thread_id))
            .or_default() += counts;
    }

    /// Records in key order
    pub fn records(&self) -> Vec<&AttributedRecord> {
        let mut keys: Vec<&RecordKey> = self.records.keys().collect();
        keys.sort();
        keys.into_iter().filter_map(|k| self.records.get(k)).collect()
    }

    pub fn record(&self, key: &RecordKey) -> Option<&AttributedRecord> {
        self.records.get(key)
    }

    pub fn file_counts(&self, event_type: EventType, step_id: u32, tid: i64, file: &str) -> Counts {
        self.files
            .get(&(event_type, step_id, tid, file.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn thread_counts(&self, event_type: EventType, step_id: u32, tid: i64) -> Counts {
        self.threads
            .get(&(event_type, step_id, tid))
            .copied()
            .unwrap_or_default()
    }

    pub fn process_counts(&self, event_type: EventType, step_id: u32, pid: i64) -> Counts {
        self.processes
            .get(&(event_type, step_id, pid))
            .copied()
            .unwrap_or_default()
    }

    /// Whole-run total of an event, including samples outside every step
    pub fn run_total(&self, event_type: EventType) -> u64 {
        self.run_totals.get(&event_type).copied().unwrap_or(0)
    }

    /// Sum of self counts over all steps
    pub fn attributed_total(&self, event_type: EventType) -> u64 {
        self.records
            .values()
            .filter(|r| r.event_type == event_type)
            .map(|r| r.self_count)
            .sum()
    }

    /// Sum of self counts of one step
    pub fn step_total(&self, event_type: EventType, step_id: u32) -> u64 {
        self.records
            .values()
            .filter(|r| r.event_type == event_type && r.step_id == step_id)
            .map(|r| r.self_count)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.files.clear();
        self.threads.clear();
        self.processes.clear();
        self.run_totals.clear();
    }
}

struct ChargeTarget<'a> {
    event_type: EventType,
    step_id: u32,
    thread: &'a PerfThread,
    process: &'a PerfThread,
    symbols: &'a SymbolTable,
}
