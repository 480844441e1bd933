//! Attribution throughput benchmark
//!
//! Measures one in-memory database load cycle: file classification, callchain
//! disassembly and per-sample aggregation.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench attribution_throughput
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loadscope::analyzer::PerfAnalyzer;
use loadscope::classify::ClassificationContext;
use loadscope::config::AnalyzerConfig;
use loadscope::round_selection::select_round;
use loadscope::row_source::MemoryRowSource;

const FILES: [&str; 6] = [
    "[kernel.kallsyms]",
    "/system/lib64/platformsdk/libark_jsruntime.so",
    "/proc/4242/root/data/storage/el1/bundle/libs/arm64/libshop.so",
    "/proc/4242/root/data/storage/el1/bundle/entry/ets/modules.abc",
    "/system/lib64/libace_compatible.z.so",
    "/vendor/lib64/libGLES_mali.so",
];

/// Capture with `chains` distinct callchains and `samples` samples over 8 threads
fn capture(chains: i64, samples: usize) -> MemoryRowSource {
    let mut source = MemoryRowSource::new().with_thread(100, 100, "com.example.shop");
    for tid in 101..108 {
        source = source.with_thread(tid, 100, &format!("worker{}", tid));
    }
    for (i, path) in FILES.iter().enumerate() {
        source = source.with_file(i as i64, path);
    }
    for id in 0..64 {
        source = source.with_symbol(id, &format!("fn_{}", id));
    }
    source = source.with_symbol(
        64,
        "onClick: [url:entry|entry|1.0.0|src/main/ets/pages/Index.ts:12:5]",
    );

    for chain in 0..chains {
        let frames: Vec<(i64, i64)> = (0..12)
            .map(|depth| {
                let file = (chain + depth) % FILES.len() as i64;
                let symbol = if file == 3 { 64 } else { (chain * 7 + depth) % 64 };
                (file, symbol)
            })
            .collect();
        source = source.with_callchain(chain, &frames);
    }

    for i in 0..samples {
        let event = if i % 2 == 0 { "hw-instructions" } else { "hw-cpu-cycles" };
        source = source.with_sample(
            (i as i64 * 31) % chains,
            100 + (i as i64 % 8),
            1_000 + i as u64,
            event,
            i as i64,
        );
    }
    source
}

fn bench_load_cycle(c: &mut Criterion) {
    let config = AnalyzerConfig::default().with_default_kinds().unwrap();
    let ctx = ClassificationContext::from_config(&config).unwrap();

    let mut group = c.benchmark_group("load_cycle");
    for samples in [1_000usize, 10_000, 50_000] {
        let source = capture(512, samples);
        group.throughput(Throughput::Elements(samples as u64));
        group.bench_with_input(BenchmarkId::from_parameter(samples), &source, |b, source| {
            let mut analyzer = PerfAnalyzer::new(&ctx);
            b.iter(|| {
                let stats = analyzer.load(black_box(source), 1).unwrap();
                black_box(stats.attributed)
            });
        });
    }
    group.finish();
}

fn bench_round_selection(c: &mut Criterion) {
    let values: Vec<u64> = (0..5).map(|i| 1_000_000 + i * 7_919).collect();
    c.bench_function("select_round_5", |b| b.iter(|| select_round(black_box(&values))));
}

criterion_group!(benches, bench_load_cycle, bench_round_selection);
criterion_main!(benches);
