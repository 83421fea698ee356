use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aura::analysis::result::AnalysisResult;
use aura::analysis::Analyzer;
use aura::cli::{Cli, Command, CompareArgs, ShowArgs, StoreArgs};
use aura::config::AppConfig;
use aura::store::{artifact_file_name, ResultStore};

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Compare(args) => handle_compare(&args),
        Command::List(args) => handle_list(&args),
        Command::Show(args) => handle_show(&args),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn handle_compare(args: &CompareArgs) -> Result<()> {
    let config = AppConfig::from_overrides(args.store.output_dir.clone(), args.settings.clone())?;
    let analyzer = Analyzer::new(config.settings)?;
    let result = analyzer
        .compare_files(args.files.as_slice())
        .context("comparison failed")?;
    let artifact = if args.no_save {
        None
    } else {
        let store = ResultStore::new(&config.output_dir);
        Some(store.save(&result).context("failed to persist comparison")?)
    };
    print_json(&summarize(&result, artifact))
}

fn handle_list(args: &StoreArgs) -> Result<()> {
    let config = AppConfig::from_overrides(args.output_dir.clone(), None)?;
    let names = ResultStore::new(&config.output_dir).list()?;
    info!(count = names.len(), "listing stored results");
    print_json(&json!({ "results": names }))
}

fn handle_show(args: &ShowArgs) -> Result<()> {
    let config = AppConfig::from_overrides(args.store.output_dir.clone(), None)?;
    let store = ResultStore::new(&config.output_dir);
    let bytes = store
        .read_raw(&args.name)?
        .ok_or_else(|| anyhow!("result not found: {}", args.name))?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&bytes).context("failed to write result")?;
    stdout.flush().context("failed to flush stdout")?;
    Ok(())
}

fn summarize(result: &AnalysisResult, saved_as: Option<String>) -> serde_json::Value {
    let [file_a, file_b] = &result.files;
    let saved = saved_as.is_some();
    let strategies: serde_json::Map<String, serde_json::Value> = result
        .alignments
        .iter()
        .map(|alignment| {
            (
                alignment.strategy.artifact_key().to_string(),
                json!({
                    "path_length": alignment.path.len(),
                    "total_cost": alignment.total_cost,
                    "cost_per_step": alignment.cost_per_step,
                }),
            )
        })
        .collect();
    json!({
        "artifact": saved_as.unwrap_or_else(|| artifact_file_name(file_a, file_b)),
        "saved": saved,
        "files": result.files,
        "durations": [result.features[0].duration, result.features[1].duration],
        "frames": [result.features[0].frame_count, result.features[1].frame_count],
        "alignments": strategies,
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{text}");
    Ok(())
}
