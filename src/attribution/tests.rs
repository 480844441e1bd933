// Aggregation tests over realistic app stacks
//
// A bytecode frame on top of the ArkTS runtime, a native library, and a
// kernel leaf: self load must land on the first app frame, total load on
// the first frame of every other category above it.

use super::*;
use crate::category::{ComponentCategory, FileClassification, OriginKind};
use crate::classify::{ClassificationRules, ComponentKindConfig, SubComponentConfig, SymbolTable};

fn classification(file: &str, category: ComponentCategory) -> FileClassification {
    FileClassification {
        file: file.to_string(),
        category,
        category_name: category.name().to_string(),
        subcategory_name: None,
        origin_kind: OriginKind::FirstParty,
    }
}

fn frame(depth: i64, symbol_id: i64, file: &str, category: ComponentCategory) -> CallFrame {
    CallFrame {
        depth,
        file_id: depth,
        symbol_id,
        classification: classification(file, category),
    }
}

fn sample(callchain_id: i64, thread_id: i64, event_count: u64, event_name: &str) -> SampleRow {
    SampleRow {
        id: 0,
        callchain_id,
        timestamp: 0,
        thread_id,
        event_count,
        event_name: event_name.to_string(),
    }
}

/// kernel leaf → runtime → app native → runtime → app bytecode (root)
fn app_chain() -> Callchain {
    Callchain::new(
        1,
        vec![
            frame(4, 1, "[kernel.kallsyms]", ComponentCategory::OsRuntime),
            frame(3, 2, "/system/lib64/platformsdk/libark_jsruntime.so", ComponentCategory::OsRuntime),
            frame(2, 3, "libshop.so", ComponentCategory::AppSo),
            frame(1, 4, "/system/lib64/libace_compatible.z.so", ComponentCategory::OsRuntime),
            frame(0, 5, "modules.abc", ComponentCategory::AppAbc),
        ],
    )
}

fn symbols() -> SymbolTable {
    let mut symbols = SymbolTable::new();
    for (id, name) in [(1, "do_syscall"), (2, "Execute"), (3, "Decode"), (4, "Render"), (5, "onClick")] {
        symbols.insert(id, name.to_string());
    }
    symbols
}

fn threads() -> ThreadTable {
    let rules = ClassificationRules::from_kinds(&[]).unwrap();
    let mut threads = ThreadTable::new();
    threads.insert(100, 100, Some("com.example.shop"), &rules);
    threads.insert(101, 100, Some("worker"), &rules);
    threads
}

#[test]
fn test_self_and_total_points() {
    let chain = app_chain();
    assert_eq!(chain.self_index(), 2);
    assert_eq!(chain.total_indices(), &[3, 4]);
}

#[test]
fn test_ingest_charges_self_and_total() {
    let chain = app_chain();
    let mut threads = threads();
    let symbols = symbols();
    let mut agg = SampleAggregator::new();

    let outcome = agg.ingest(&sample(1, 101, 500, "hw-instructions"), Some(0), &chain, &mut threads, &symbols);
    assert_eq!(outcome, IngestOutcome::Attributed);

    let records = agg.records();
    assert_eq!(records.len(), 3);

    let self_record = records.iter().find(|r| r.self_count > 0).unwrap();
    assert_eq!(self_record.file, "libshop.so");
    assert_eq!(self_record.symbol, "Decode");
    assert_eq!(self_record.category, ComponentCategory::AppSo);
    assert_eq!(self_record.process_name, "com.example.shop");
    assert_eq!(self_record.thread_name, "worker");
    assert_eq!(self_record.pid, 100);
    assert_eq!(self_record.event_type, EventType::Instructions);

    let totals: Vec<&str> = records
        .iter()
        .filter(|r| r.total_count > 0)
        .map(|r| r.symbol.as_str())
        .collect();
    assert_eq!(totals.len(), 2);
    assert!(totals.contains(&"Render"));
    assert!(totals.contains(&"onClick"));
}

#[test]
fn test_self_load_is_conserved() {
    let chain = app_chain();
    let empty = Callchain::new(2, Vec::new());
    let mut threads = threads();
    let symbols = symbols();
    let mut agg = SampleAggregator::new();

    agg.ingest(&sample(1, 101, 300, "cpu-cycles"), Some(0), &chain, &mut threads, &symbols);
    agg.ingest(&sample(2, 101, 200, "hw-cpu-cycles"), Some(0), &empty, &mut threads, &symbols);
    agg.ingest(&sample(1, 100, 50, "raw-cpu-cycles"), Some(1), &chain, &mut threads, &symbols);

    assert_eq!(agg.attributed_total(EventType::Cycles), 550);
    assert_eq!(agg.run_total(EventType::Cycles), 550);
    assert_eq!(agg.step_total(EventType::Cycles, 0), 500);
    assert_eq!(agg.step_total(EventType::Cycles, 1), 50);
    assert_eq!(agg.attributed_total(EventType::Instructions), 0);
}

#[test]
fn test_empty_chain_charged_to_unknown() {
    let empty = Callchain::new(2, Vec::new());
    let mut threads = threads();
    let symbols = symbols();
    let mut agg = SampleAggregator::new();

    agg.ingest(&sample(2, 100, 80, "instructions"), Some(0), &empty, &mut threads, &symbols);
    let records = agg.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category, ComponentCategory::Unknown);
    assert_eq!(records[0].self_count, 80);
    assert_eq!(records[0].total_count, 0);
}

#[test]
fn test_rollups_match_records() {
    let chain = app_chain();
    let mut threads = threads();
    let symbols = symbols();
    let mut agg = SampleAggregator::new();

    agg.ingest(&sample(1, 101, 10, "instructions"), Some(0), &chain, &mut threads, &symbols);
    agg.ingest(&sample(1, 101, 15, "instructions"), Some(0), &chain, &mut threads, &symbols);
    agg.ingest(&sample(1, 100, 5, "instructions"), Some(0), &chain, &mut threads, &symbols);

    let worker = agg.thread_counts(EventType::Instructions, 0, 101);
    assert_eq!(worker.self_count, 25);
    assert_eq!(worker.total_count, 50);

    let process = agg.process_counts(EventType::Instructions, 0, 100);
    assert_eq!(process.self_count, 30);
    assert_eq!(process.total_count, 60);

    let file = agg.file_counts(EventType::Instructions, 0, 101, "libshop.so");
    assert_eq!(file.self_count, 25);
    assert_eq!(file.total_count, 0);

    let key = RecordKey {
        event_type: EventType::Instructions,
        step_id: 0,
        tid: 101,
        file: "modules.abc".to_string(),
        symbol: "onClick".to_string(),
    };
    assert_eq!(agg.record(&key).unwrap().total_count, 25);
}

#[test]
fn test_outside_window_counts_only_in_run_total() {
    let chain = app_chain();
    let mut threads = threads();
    let symbols = symbols();
    let mut agg = SampleAggregator::new();

    let outcome = agg.ingest(&sample(1, 101, 70, "instructions"), None, &chain, &mut threads, &symbols);
    assert_eq!(outcome, IngestOutcome::OutsideWindow);
    assert!(agg.is_empty());
    assert_eq!(agg.run_total(EventType::Instructions), 70);
}

#[test]
fn test_unsupported_event_ignored() {
    let chain = app_chain();
    let mut threads = threads();
    let symbols = symbols();
    let mut agg = SampleAggregator::new();

    let outcome = agg.ingest(&sample(1, 101, 70, "sched:sched_switch"), Some(0), &chain, &mut threads, &symbols);
    assert_eq!(outcome, IngestOutcome::Ignored);
    assert_eq!(agg.run_total(EventType::Instructions), 0);
    assert_eq!(agg.run_total(EventType::Cycles), 0);
}

#[test]
fn test_thread_classification_overrides_frames() {
    let chain = app_chain();
    let symbols = symbols();
    let rules = ClassificationRules::from_kinds(&[ComponentKindConfig {
        name: "Flutter".to_string(),
        kind: ComponentCategory::Flutter,
        components: vec![SubComponentConfig {
            threads: vec![r"^\d+\.ui$".to_string()],
            ..Default::default()
        }],
    }])
    .unwrap();
    let mut threads = ThreadTable::new();
    threads.insert(200, 200, Some("com.example.shop"), &rules);
    threads.insert(201, 200, Some("1.ui"), &rules);

    let mut agg = SampleAggregator::new();
    agg.ingest(&sample(1, 200, 1, "instructions"), Some(0), &chain, &mut threads, &symbols);
    assert!(agg.records().iter().all(|r| r.category != ComponentCategory::Flutter));

    let mut agg = SampleAggregator::new();
    agg.ingest(&sample(1, 201, 9, "instructions"), Some(0), &chain, &mut threads, &symbols);
    let records = agg.records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.category == ComponentCategory::Flutter));
    assert!(records.iter().all(|r| r.category_name == "Flutter"));

    // file and symbol identity is kept; the subcategory falls back to the file name
    let self_record = records.iter().find(|r| r.self_count == 9).unwrap();
    assert_eq!(self_record.file, "libshop.so");
    assert_eq!(self_record.subcategory_name.as_deref(), Some("libshop.so"));
}

#[test]
fn test_ingest_order_does_not_matter() {
    let chain = app_chain();
    let symbols = symbols();
    let samples = [
        sample(1, 101, 10, "instructions"),
        sample(1, 100, 20, "cpu-cycles"),
        sample(1, 101, 30, "instructions"),
    ];

    let mut forward = SampleAggregator::new();
    let mut forward_threads = threads();
    for s in &samples {
        forward.ingest(s, Some(0), &chain, &mut forward_threads, &symbols);
    }

    let mut backward = SampleAggregator::new();
    let mut backward_threads = threads();
    for s in samples.iter().rev() {
        backward.ingest(s, Some(0), &chain, &mut backward_threads, &symbols);
    }

    assert_eq!(forward.records(), backward.records());
}

#[test]
fn test_event_aliases() {
    for name in CYCLES_EVENTS {
        assert_eq!(EventType::from_event_name(name), Some(EventType::Cycles));
    }
    for name in INSTRUCTION_EVENTS {
        assert_eq!(EventType::from_event_name(name), Some(EventType::Instructions));
    }
    assert_eq!(EventType::Cycles.aliases().len(), 3);
    assert_eq!(EventType::Instructions.label(), "INSTRUCTION_EVENT");
    assert_eq!(EventType::Cycles.to_string(), "cycles");
}
