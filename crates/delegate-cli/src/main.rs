//! `delegate`: replays recorded delegation scenarios through the engine and
//! classifies saved results.

mod scenario;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use delegate_engine::{EngineConfig, ExecutionSnapshot, classify_snapshot};
use serde::Serialize;

use crate::scenario::Scenario;

#[derive(Parser)]
#[command(name = "delegate")]
#[command(about = "Run delegated connector tasks from recorded scenarios")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario file and print the terminal result as JSON
    Run(RunArgs),
    /// Classify a saved terminal result
    Classify(ClassifyArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Scenario JSON file
    #[arg(value_name = "FILE")]
    scenario: PathBuf,

    /// Print every progress snapshot as a JSON line before the result
    #[arg(long)]
    progress: bool,

    /// Attach a pass/fail classification to the output
    #[arg(long)]
    classify: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Override the step bound (otherwise DELEGATE_MAX_STEPS or 8)
    #[arg(long)]
    max_steps: Option<u32>,

    /// Abort the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args)]
struct ClassifyArgs {
    /// Terminal result JSON, as printed by `delegate run`
    #[arg(value_name = "FILE")]
    result: PathBuf,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutput<'a> {
    result: &'a ExecutionSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    classification: Option<delegate_engine::ClassificationResult>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    delegate_engine::init_observability();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Classify(args) => classify(args),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let scenario = Scenario::load(&args.scenario)?;
    let mut config = EngineConfig::from_env().context("invalid engine configuration")?;
    if let Some(max_steps) = args.max_steps {
        config = config.max_steps(max_steps);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.timeout(Duration::from_secs(secs));
    }

    let engine = scenario.engine(config)?;
    let mut stream = engine.delegate(scenario.caller.clone(), scenario.input.clone());
    tracing::info!(run_id = %stream.run_id(), scenario = %args.scenario.display(), "replaying scenario");
    while let Some(snapshot) = stream.next_snapshot().await {
        if args.progress {
            println!("{}", serde_json::to_string(&snapshot)?);
        }
    }
    let result = stream.finish().await;

    let output = RunOutput {
        result: &result,
        classification: args.classify.then(|| classify_snapshot(&result)),
    };
    print_json(&output, args.pretty)?;
    Ok(exit_code(&result))
}

fn classify(args: ClassifyArgs) -> anyhow::Result<ExitCode> {
    let raw = std::fs::read_to_string(&args.result)
        .with_context(|| format!("failed to read result {}", args.result.display()))?;
    let snapshot: ExecutionSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse result {}", args.result.display()))?;
    let classification = classify_snapshot(&snapshot);
    print_json(&classification, args.pretty)?;
    Ok(if classification.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn print_json(value: &impl Serialize, pretty: bool) -> anyhow::Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}

fn exit_code(result: &ExecutionSnapshot) -> ExitCode {
    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
