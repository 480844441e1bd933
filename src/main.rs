use anyhow::{Context, Result};
use clap::Parser;
use loadscope::classify::ClassificationContext;
use loadscope::cli::{Cli, OutputFormat};
use loadscope::config::AnalyzerConfig;
use loadscope::converter::Converter;
use loadscope::csv_output::{callchains_to_csv, CsvOutput, CALLCHAIN_FILE, SYMBOL_DETAILS_FILE};
use loadscope::json_output::write_json;
use loadscope::perf_db::ReportDb;
use loadscope::pipeline::{Pipeline, PipelineOutput, SqliteOpener};
use loadscope::scenario::Scene;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

const REPORT_DB_FILE: &str = "report.db";

/// Initialize tracing subscriber; `--debug` forces TRACE
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Cli) -> Result<AnalyzerConfig> {
    let config = match &args.config {
        Some(path) => AnalyzerConfig::from_toml(path)?,
        None => AnalyzerConfig::default(),
    };
    let mut config = config.with_default_kinds()?;
    args.apply_to(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn write_report_db(dir: &Path, scene: &Scene, output: &PipelineOutput) -> Result<()> {
    let path = dir.join(REPORT_DB_FILE);
    if path.is_file() {
        fs::remove_file(&path).with_context(|| format!("Failed to replace {}", path.display()))?;
    }

    let mut db = ReportDb::create(&path)?;
    db.insert_steps(&output.windows)?;
    let rows = db.insert_symbol_details(&scene.test_info.app_version, &scene.name(), &output.details)?;
    tracing::info!("Wrote {} symbol rows to {}", rows, path.display());
    Ok(())
}

fn write_outputs(dir: &Path, format: OutputFormat, scene: &Scene, output: &PipelineOutput) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    match format {
        OutputFormat::Json => write_json(dir, &output.report, &output.summaries)?,
        OutputFormat::Csv => {
            let mut csv = CsvOutput::new(&scene.test_info.app_version, &scene.name());
            csv.extend(output.details.iter().cloned());
            let path = dir.join(SYMBOL_DETAILS_FILE);
            fs::write(&path, csv.to_csv()).with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    if !output.callchains.is_empty() {
        let path = dir.join(CALLCHAIN_FILE);
        fs::write(&path, callchains_to_csv(&output.callchains))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    write_report_db(dir, scene, output)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let ctx = ClassificationContext::from_config(&config)?;
    let scene = Scene::load(&args.input, config.choose_round)?;

    let converter = config.converter.as_ref().map(Converter::from_config);
    let opener = SqliteOpener::new(converter, config.app_bundle.clone());
    let output = Pipeline::new(&ctx, opener)
        .with_callchain_dump(config.save_callchain)
        .run(&scene)
        .with_context(|| format!("Analysis of {} failed", args.input.display()))?;

    let out_dir = args.output.clone().unwrap_or_else(|| scene.report_dir());
    write_outputs(&out_dir, args.format, &scene, &output)?;

    let failed = output.report.steps.iter().filter(|s| s.is_failed()).count();
    if failed > 0 {
        tracing::warn!("{} of {} steps failed", failed, output.report.steps.len());
    }
    println!("Report written to {}", out_dir.display());
    Ok(())
}
