//! `analyst scenario run` — loads a scenario file, runs it once per
//! requested memory configuration against an isolated state store
//! each, and writes the comparison report plus the JSONL run log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use analyst_core::clock::{Clock, FixedClock};
use analyst_core::config::AnalystConfig;
use analyst_core::llm::LLMClient;
use analyst_core::run::MemoryMode;
use analyst_core::scenario::ScenarioRunner;
use analyst_core::store::{SqliteStateStore, StateStore};
use analyst_core::testing::{ConfusedFakeLlmClient, FakeLlmClient};
use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::dataset;
use crate::report;
use crate::run_log::RunLogWriter;
use crate::scenario_file;

#[derive(Debug, Clone, Copy)]
pub enum FakeLlmMode {
    /// No LLM at all — every stage uses its heuristic fallback.
    None,
    /// `ConfusedFakeLlmClient`, the scripted demo affordance from §9's
    /// baseline-confused open question.
    Confused,
    /// A single scripted response, mostly useful for smoke-testing
    /// the plan-parse path without a real provider.
    Scripted(String),
}

pub struct RunArgs {
    pub scenario_path: PathBuf,
    pub user_id: String,
    pub configs: Vec<MemoryMode>,
    pub repeat: usize,
    pub report_path: PathBuf,
    pub run_log_dir: PathBuf,
    pub state_dir: PathBuf,
    pub fake_llm: Option<FakeLlmMode>,
}

pub fn parse_configs(raw: &str) -> Result<Vec<MemoryMode>> {
    raw.split(',')
        .map(|s| match s.trim() {
            "baseline" => Ok(MemoryMode::Baseline),
            "read" => Ok(MemoryMode::Read),
            "readwrite" => Ok(MemoryMode::Readwrite),
            "readwrite_cache" => Ok(MemoryMode::ReadwriteCache),
            other => bail!("unknown memory mode: {other}"),
        })
        .collect()
}

fn state_path_for(state_dir: &Path, scenario_id: &str, mode: MemoryMode) -> PathBuf {
    state_dir.join(format!("{scenario_id}-{}.sqlite3", mode.as_str()))
}

pub async fn run(args: RunArgs) -> Result<()> {
    let scenario = scenario_file::load(&args.scenario_path)?;
    info!(scenario = %scenario.id, steps = scenario.steps.len(), "loaded scenario");

    let dataset = Arc::new(dataset::for_scenario(scenario.seed, &scenario.today));
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::from_iso(&scenario.today).expect("scenario `today` already validated"));

    let llm: Option<Arc<dyn LLMClient>> = match args.fake_llm {
        Some(FakeLlmMode::None) => None,
        Some(FakeLlmMode::Confused) => Some(Arc::new(ConfusedFakeLlmClient)),
        Some(FakeLlmMode::Scripted(text)) => Some(Arc::new(FakeLlmClient::single(text))),
        None => {
            let config = AnalystConfig::from_env()?;
            config.llm.map(|c| Arc::new(c) as Arc<dyn LLMClient>)
        }
    };

    let scenario_id = scenario.id.clone();
    let state_dir = args.state_dir.clone();
    let store_factory = move |mode: MemoryMode| -> Arc<dyn StateStore> {
        let path = state_path_for(&state_dir, &scenario_id, mode);
        Arc::new(SqliteStateStore::open(&path).expect("open state store")) as Arc<dyn StateStore>
    };

    let run_log = RunLogWriter::new(args.run_log_dir.clone());
    let on_run: Box<dyn Fn(&analyst_core::run::Run) + Send + Sync> = Box::new(move |run| {
        if let Err(e) = run_log.append(run) {
            warn!(error = %e, "run log append failed (best-effort)");
        }
    });

    let runner = ScenarioRunner { llm, dataset, clock, store_factory, on_run: Some(on_run) };

    let report = runner.run(&scenario, &args.user_id, &args.configs, args.repeat).await?;

    for summary in &report.summaries {
        info!(
            config = summary.config.as_str(),
            avg_quality = summary.aggregate.avg_quality,
            question_level_acc_rate = summary.aggregate.question_level_acc_rate,
            tool_calls_total = summary.aggregate.tool_calls_total,
            cached_tool_calls_total = summary.aggregate.cached_tool_calls_total,
            p90_latency_ms = summary.aggregate.p90_latency_ms,
            "config summary"
        );
    }

    report::write(&report, &args.report_path)?;
    info!(path = %args.report_path.display(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_configs_accepts_all_four_modes() {
        let modes = parse_configs("baseline,read,readwrite,readwrite_cache").unwrap();
        assert_eq!(modes.len(), 4);
    }

    #[test]
    fn parse_configs_rejects_unknown_mode() {
        assert!(parse_configs("baseline,bogus").is_err());
    }
}
