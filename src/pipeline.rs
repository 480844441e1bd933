//! Scenario analysis driver
//!
//! For every step: score each round by its retired instructions, pick the
//! representative round, then run the full attribution on that round's
//! database only. A step without a usable round is reported as failed; the
//! run fails only when every step does.

use crate::analyzer::{CallchainDumpRow, PerfAnalyzer};
use crate::attribution::{AttributedRecord, EventType};
use crate::classify::ClassificationContext;
use crate::converter::{ensure_database, Converter};
use crate::error::{AnalysisError, Result};
use crate::perf_db::SqliteRowSource;
use crate::report::{
    perf_id, symbol_details, ChosenRound, PerfReport, ReportAssembler, ReportHeader, SummaryInfo,
    SymbolDetail,
};
use crate::round_selection::{select_candidate, RoundCandidate};
use crate::row_source::RowSource;
use crate::scenario::{Scene, StepArtifacts, StepInfo};
use crate::step_window::StepWindow;
use std::path::PathBuf;

/// Opens the row source of one step in one round
pub trait SourceOpener {
    type Source: RowSource;

    fn open(&self, artifacts: &StepArtifacts) -> Result<Self::Source>;
}

/// Opens capture databases, converting raw captures when a converter is configured
#[derive(Debug, Clone, Default)]
pub struct SqliteOpener {
    converter: Option<Converter>,
    app_bundle: Option<String>,
}

impl SqliteOpener {
    pub fn new(converter: Option<Converter>, app_bundle: Option<String>) -> Self {
        Self {
            converter,
            app_bundle,
        }
    }
}

impl SourceOpener for SqliteOpener {
    type Source = SqliteRowSource;

    fn open(&self, artifacts: &StepArtifacts) -> Result<SqliteRowSource> {
        let db = ensure_database(&artifacts.perf_data, &artifacts.perf_db, self.converter.as_ref())?;
        SqliteRowSource::open(db, self.app_bundle.as_deref())
    }
}

/// Everything one run produces, ready for the writers
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: PerfReport,
    pub details: Vec<SymbolDetail>,
    /// Step windows of the chosen rounds, numbered across the whole run
    pub windows: Vec<StepWindow>,
    pub summaries: Vec<SummaryInfo>,
    /// Empty unless callchain dumps are enabled
    pub callchains: Vec<CallchainDumpRow>,
}

/// Result of the chosen round of one step
struct StepResult {
    records: Vec<AttributedRecord>,
    details: Vec<SymbolDetail>,
    windows: Vec<StepWindow>,
    callchains: Vec<CallchainDumpRow>,
}

pub struct Pipeline<'a, O> {
    ctx: &'a ClassificationContext,
    opener: O,
    save_callchain: bool,
}

impl<'a, O: SourceOpener> Pipeline<'a, O> {
    pub fn new(ctx: &'a ClassificationContext, opener: O) -> Self {
        Self {
            ctx,
            opener,
            save_callchain: false,
        }
    }

    pub fn with_callchain_dump(mut self, enabled: bool) -> Self {
        self.save_callchain = enabled;
        self
    }

    /// Analyze every step of a scene
    ///
    /// # Errors
    /// `AllStepsFailed` when no step had a usable round. Errors that are not
    /// local to one round abort the run.
    pub fn run(&self, scene: &Scene) -> Result<PipelineOutput> {
        let mut assembler = ReportAssembler::new();
        let mut analyzer = PerfAnalyzer::new(self.ctx);
        let mut details = Vec::new();
        let mut windows: Vec<StepWindow> = Vec::new();
        let mut summaries = Vec::new();
        let mut callchains = Vec::new();
        let mut chosen_dbs: Vec<PathBuf> = Vec::new();

        tracing::info!(
            "Analyzing scene {} ({} steps, {} rounds)",
            scene.name(),
            scene.steps.len(),
            scene.rounds.len()
        );

        for step in &scene.steps {
            let name = step.display_name();
            let (candidate, source) = match self.choose_round(scene, step) {
                Ok(chosen) => chosen,
                Err(e) => {
                    tracing::warn!("Step {} ({}) failed: {}", step.step_idx, name, e);
                    assembler.add_failed_step(step.step_idx, name, &e.to_string());
                    continue;
                }
            };
            let Some(artifacts) = scene.artifacts(candidate.round_index, step) else {
                continue;
            };

            let result = match self.attribute(&mut analyzer, &source, step) {
                Ok(result) => result,
                Err(e) if e.is_round_local() => {
                    tracing::warn!("Step {} ({}) failed: {}", step.step_idx, name, e);
                    assembler.add_failed_step(step.step_idx, name, &e.to_string());
                    continue;
                }
                Err(e) => return Err(e),
            };

            assembler.add_step(
                step.step_idx,
                name,
                ChosenRound {
                    round: candidate.round_index,
                    count: candidate.scalar,
                    perf_data_path: artifacts.perf_data.display().to_string(),
                },
                &result.records,
            );
            summaries.push(SummaryInfo {
                rom_version: scene.result_info.rom_version.clone(),
                app_version: scene.test_info.app_version.clone(),
                scene: scene.name(),
                step_name: name.to_string(),
                step_id: step.step_idx,
                count: candidate.scalar,
            });
            details.extend(result.details);
            windows.extend(result.windows);
            callchains.extend(result.callchains);
            chosen_dbs.push(artifacts.perf_db);
        }

        if !scene.steps.is_empty() && assembler.failed_steps() == scene.steps.len() {
            return Err(AnalysisError::AllStepsFailed(scene.steps.len()));
        }

        for (i, window) in windows.iter_mut().enumerate() {
            window.step_id = i as u32;
        }

        let perf_id = match perf_id(&chosen_dbs) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Cannot hash chosen databases: {}", e);
                String::new()
            }
        };
        let report = assembler.finish(ReportHeader {
            perf_id,
            perf_path: chosen_dbs.iter().map(|p| p.display().to_string()).collect(),
            scene: scene.name(),
            app_id: scene.test_info.app_id.clone(),
            app_version: scene.test_info.app_version.clone(),
            os_version: scene.result_info.rom_version.clone(),
            timestamp: scene.test_info.timestamp,
        });
        Ok(PipelineOutput {
            report,
            details,
            windows,
            summaries,
            callchains,
        })
    }

    /// Score every round of a step and keep the representative one open
    fn choose_round(&self, scene: &Scene, step: &StepInfo) -> Result<(RoundCandidate, O::Source)> {
        let mut candidates = Vec::new();
        let mut sources = Vec::new();

        for round_index in 0..scene.rounds.len() {
            let Some(artifacts) = scene.artifacts(round_index, step) else {
                continue;
            };
            let scored = self
                .opener
                .open(&artifacts)
                .and_then(|source| Ok((source.event_total(EventType::Instructions)?, source)));
            match scored {
                Ok((scalar, source)) => {
                    tracing::debug!("Step {} round {}: {} instructions", step.step_idx, round_index, scalar);
                    candidates.push(RoundCandidate { round_index, scalar });
                    sources.push(source);
                }
                Err(e) if e.is_round_local() => {
                    tracing::warn!("Skipping round {} of step {}: {}", round_index, step.step_idx, e);
                }
                Err(e) => return Err(e),
            }
        }

        let chosen = select_candidate(&candidates)
            .ok_or(AnalysisError::InsufficientRoundData { step: step.step_idx })?;
        tracing::info!(
            "Step {}: round {} chosen from {} candidates",
            step.step_idx,
            chosen.round_index,
            candidates.len()
        );

        let position = candidates
            .iter()
            .position(|c| c.round_index == chosen.round_index)
            .ok_or(AnalysisError::InsufficientRoundData { step: step.step_idx })?;
        Ok((chosen, sources.swap_remove(position)))
    }

    fn attribute(&self, analyzer: &mut PerfAnalyzer<'_>, source: &O::Source, step: &StepInfo) -> Result<StepResult> {
        analyzer.load(source, step.step_idx)?;

        let result = StepResult {
            records: analyzer.records().into_iter().cloned().collect(),
            details: symbol_details(analyzer.aggregator()),
            windows: analyzer.windows().to_vec(),
            callchains: if self.save_callchain {
                analyzer.callchain_dump()
            } else {
                Vec::new()
            },
        };
        analyzer.clear();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::row_source::MemoryRowSource;
    use crate::scenario::{ResultInfo, TestInfo};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;

    const LIBSHOP: &str = "/proc/7/root/data/storage/el1/bundle/libs/arm64/libshop.so";

    /// Databases keyed by path; every open is recorded
    #[derive(Default)]
    struct MemoryOpener {
        sources: HashMap<PathBuf, MemoryRowSource>,
        opened: RefCell<Vec<PathBuf>>,
    }

    impl MemoryOpener {
        fn with(mut self, round_dir: &str, step: u32, source: MemoryRowSource) -> Self {
            let artifacts = StepArtifacts::new(Path::new(round_dir), step);
            self.sources.insert(artifacts.perf_db, source);
            self
        }
    }

    impl SourceOpener for &MemoryOpener {
        type Source = MemoryRowSource;

        fn open(&self, artifacts: &StepArtifacts) -> Result<MemoryRowSource> {
            self.opened.borrow_mut().push(artifacts.perf_db.clone());
            self.sources
                .get(&artifacts.perf_db)
                .cloned()
                .ok_or_else(|| AnalysisError::MissingArtifact {
                    path: artifacts.perf_db.clone(),
                })
        }
    }

    fn round(instructions: &[u64]) -> MemoryRowSource {
        let mut source = MemoryRowSource::new()
            .with_thread(7, 7, "com.example.shop")
            .with_file(1, LIBSHOP)
            .with_symbol(10, "Decode")
            .with_callchain(1, &[(1, 10)]);
        for (i, &count) in instructions.iter().enumerate() {
            source = source.with_sample(1, 7, count, "hw-instructions", 100 + i as i64);
        }
        source
    }

    fn scene(rounds: &[&str], steps: &[u32]) -> Scene {
        Scene {
            root: PathBuf::from("/scene"),
            rounds: rounds.iter().map(PathBuf::from).collect(),
            steps: steps
                .iter()
                .map(|&i| StepInfo {
                    name: format!("step{}", i),
                    step_idx: i,
                    description: String::new(),
                })
                .collect(),
            test_info: TestInfo {
                app_id: "com.example.shop".to_string(),
                app_version: "1.0".to_string(),
                scene: "ShopLaunch".to_string(),
                timestamp: 1_700_000_000,
                ..Default::default()
            },
            result_info: ResultInfo {
                rom_version: "5.0.0".to_string(),
                device_sn: "SN1".to_string(),
            },
        }
    }

    fn context() -> ClassificationContext {
        let config = AnalyzerConfig::default().with_default_kinds().unwrap();
        ClassificationContext::from_config(&config).unwrap()
    }

    #[test]
    fn test_middle_round_is_attributed() {
        let opener = MemoryOpener::default()
            .with("/r0", 1, round(&[100]))
            .with("/r1", 1, round(&[60, 70]))
            .with("/r2", 1, round(&[300]));
        let ctx = context();
        let output = Pipeline::new(&ctx, &opener)
            .run(&scene(&["/r0", "/r1", "/r2"], &[1]))
            .unwrap();

        let step = &output.report.steps[0];
        assert_eq!(step.round, Some(1));
        assert_eq!(step.count, 130);
        assert_eq!(step.event(EventType::Instructions).unwrap().self_count, 130);

        assert_eq!(output.summaries.len(), 1);
        assert_eq!(output.summaries[0].count, 130);
        assert_eq!(output.summaries[0].scene, "ShopLaunch");
        assert_eq!(output.summaries[0].rom_version, "5.0.0");
        assert_eq!(output.report.os_version, "5.0.0");
        assert_eq!(output.report.timestamp, 1_700_000_000);
        assert_eq!(output.details.len(), 1);
        assert_eq!(output.details[0].symbol_events, 130);
        assert_eq!(output.report.perf_path, vec!["/r1/hiperf/step1/perf.db"]);
        assert!(output.callchains.is_empty());
    }

    #[test]
    fn test_failed_round_is_excluded() {
        let opener = MemoryOpener::default()
            .with("/r0", 1, round(&[100]))
            .with("/r2", 1, round(&[300]));
        let ctx = context();
        let output = Pipeline::new(&ctx, &opener)
            .run(&scene(&["/r0", "/r1", "/r2"], &[1]))
            .unwrap();
        // two candidates: the first is representative
        assert_eq!(output.report.steps[0].round, Some(0));
    }

    #[test]
    fn test_step_without_rounds_fails_alone() {
        let opener = MemoryOpener::default().with("/r0", 1, round(&[100]));
        let ctx = context();
        let output = Pipeline::new(&ctx, &opener)
            .run(&scene(&["/r0"], &[1, 2]))
            .unwrap();

        let failed = &output.report.steps[1];
        assert!(failed.is_failed());
        assert_eq!(failed.count, 0);
        assert!(failed.error.as_deref().unwrap().contains("step 2"));
        assert_eq!(failed.event(EventType::Instructions).unwrap().self_count, 0);
        assert_eq!(output.summaries.len(), 1);
    }

    #[test]
    fn test_all_steps_failed() {
        let opener = MemoryOpener::default();
        let ctx = context();
        let err = Pipeline::new(&ctx, &opener)
            .run(&scene(&["/r0"], &[1, 2]))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::AllStepsFailed(2)));
    }

    #[test]
    fn test_windows_numbered_across_steps() {
        let opener = MemoryOpener::default()
            .with("/r0", 1, round(&[10]))
            .with("/r0", 2, round(&[20]));
        let ctx = context();
        let output = Pipeline::new(&ctx, &opener)
            .run(&scene(&["/r0"], &[1, 2]))
            .unwrap();
        let ids: Vec<(u32, u32)> = output.windows.iter().map(|w| (w.step_id, w.group_id)).collect();
        assert_eq!(ids, [(0, 1), (1, 2)]);
    }

    #[test]
    fn test_callchain_dump_enabled() {
        let opener = MemoryOpener::default().with("/r0", 1, round(&[10]));
        let ctx = context();
        let output = Pipeline::new(&ctx, &opener)
            .with_callchain_dump(true)
            .run(&scene(&["/r0"], &[1]))
            .unwrap();
        assert_eq!(output.callchains.len(), 1);
        assert_eq!(output.callchains[0].load.label(), "Self");
    }

    #[test]
    fn test_each_round_opened_once() {
        let opener = MemoryOpener::default()
            .with("/r0", 1, round(&[100]))
            .with("/r1", 1, round(&[130]))
            .with("/r2", 1, round(&[300]));
        let ctx = context();
        Pipeline::new(&ctx, &opener)
            .run(&scene(&["/r0", "/r1", "/r2"], &[1]))
            .unwrap();
        assert_eq!(opener.opened.borrow().len(), 3);
    }
}
