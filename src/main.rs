//! `analyst` — the scenario CLI driving the memory-augmented
//! seller-analytics orchestrator (`analyst-core`) end to end. Owns the
//! collaborators §1 calls out of scope for the core: scenario file
//! loading, run-log writing, report building, the seeded dataset, and
//! real-vs-fake `LLMClient` wiring.

mod commands;
mod dataset;
mod report;
mod run_log;
mod scenario_file;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use commands::scenario::{FakeLlmMode, RunArgs};

#[derive(Parser)]
#[command(name = "analyst", version, about = "Memory-augmented seller-analytics scenario runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scenario comparison harness.
    Scenario {
        #[command(subcommand)]
        action: ScenarioAction,
    },
}

#[derive(Subcommand)]
enum ScenarioAction {
    /// Run a scenario file once per memory configuration and write a
    /// comparison report.
    Run(ScenarioRunArgs),
}

#[derive(Args)]
struct ScenarioRunArgs {
    /// Path to the scenario JSON file (§6 scenario file format).
    #[arg(long)]
    file: PathBuf,

    /// User id the scenario runs as.
    #[arg(long, default_value = "demo")]
    user_id: String,

    /// Comma-separated memory modes: baseline,read,readwrite,readwrite_cache.
    #[arg(long, default_value = "baseline,read,readwrite,readwrite_cache")]
    configs: String,

    /// Number of passes through the scenario's steps per config.
    #[arg(long, default_value_t = 1)]
    repeat: usize,

    /// Where to write the `{scenario, summaries}` report JSON.
    #[arg(long, default_value = "report.json")]
    report: PathBuf,

    /// Directory for `runs-YYYYMMDD.jsonl` run logs.
    #[arg(long, default_value = "runs")]
    run_log_dir: PathBuf,

    /// Directory for per-config SQLite state files.
    #[arg(long, default_value = "state")]
    state_dir: PathBuf,

    /// Use a scripted LLM instead of a real provider: `none` (heuristics
    /// only) or `confused` (the baseline-confused demo affordance, §9).
    #[arg(long)]
    fake_llm: Option<String>,
}

fn parse_fake_llm(raw: &str) -> anyhow::Result<FakeLlmMode> {
    match raw {
        "none" => Ok(FakeLlmMode::None),
        "confused" => Ok(FakeLlmMode::Confused),
        other => Ok(FakeLlmMode::Scripted(other.to_string())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scenario { action } => match action {
            ScenarioAction::Run(args) => {
                let configs = commands::scenario::parse_configs(&args.configs)?;
                let fake_llm = args.fake_llm.as_deref().map(parse_fake_llm).transpose()?;
                let run_args = RunArgs {
                    scenario_path: args.file,
                    user_id: args.user_id,
                    configs,
                    repeat: args.repeat,
                    report_path: args.report,
                    run_log_dir: args.run_log_dir,
                    state_dir: args.state_dir,
                    fake_llm,
                };
                commands::scenario::run(run_args).await?;
            }
        },
    }
    Ok(())
}
