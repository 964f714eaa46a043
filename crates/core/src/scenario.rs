//! Multi-step, multi-config comparison harness (§4.12). Drives the
//! same scripted steps through an [`Orchestrator`] once per memory
//! configuration, each against its own isolated [`StateStore`], and
//! aggregates the resulting scores and latencies.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::AnalystError;
use crate::llm::LLMClient;
use crate::orchestrator::Orchestrator;
use crate::run::{MemoryMode, OrchestratorConfig, Run};
use crate::session::SessionState;
use crate::store::StateStore;
use crate::tools::DatasetQuery;

/// One query in a scenario script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub id: Option<String>,
    pub query: String,
}

/// `{ id, title, seed, today, steps }` — the scenario file format (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub seed: u64,
    pub today: String,
    pub steps: Vec<ScenarioStep>,
}

/// Per-step result recorded by one pass through the scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: Option<String>,
    pub query: String,
    pub tool_calls: usize,
    pub cached_tool_calls: usize,
    pub latency_ms: i64,
    pub quality: Option<f64>,
    pub correctness: Option<f64>,
    pub completeness: Option<f64>,
    pub relevance: Option<f64>,
    pub question_level_acc: Option<bool>,
}

impl StepOutcome {
    fn from_run(run: &Run) -> Self {
        let latency_ms = run.latencies.manager_route_ms + run.latencies.worker_total_ms + run.latencies.eval_ms;
        let cached = run.tool_calls.iter().filter(|c| c.cached).count();
        let (quality, correctness, completeness, relevance, qla) = match &run.eval {
            Some(e) => (Some(e.quality), Some(e.correctness), Some(e.completeness), Some(e.relevance), Some(e.question_level_accurate())),
            None => (None, None, None, None, None),
        };
        Self {
            step_id: None,
            query: run.query.clone(),
            tool_calls: run.tool_calls.len(),
            cached_tool_calls: cached,
            latency_ms,
            quality,
            correctness,
            completeness,
            relevance,
            question_level_acc: qla,
        }
    }
}

/// Aggregated metrics across every pass/step for one config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregate {
    pub avg_quality: f64,
    pub question_level_acc_rate: f64,
    pub tool_calls_total: usize,
    pub cached_tool_calls_total: usize,
    pub p90_latency_ms: Option<i64>,
}

/// `p90 = sorted[floor((n-1)*0.9)]`, `None` when `values` is empty.
pub fn p90(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((sorted.len() - 1) as f64 * 0.9).floor() as usize;
    Some(sorted[idx])
}

fn aggregate(runs: &[StepOutcome]) -> Aggregate {
    let scored: Vec<&StepOutcome> = runs.iter().filter(|r| r.quality.is_some()).collect();
    let avg_quality = if scored.is_empty() { 0.0 } else { scored.iter().map(|r| r.quality.unwrap()).sum::<f64>() / scored.len() as f64 };
    let acc_count = scored.iter().filter(|r| r.question_level_acc == Some(true)).count();
    let question_level_acc_rate = if scored.is_empty() { 0.0 } else { acc_count as f64 / scored.len() as f64 };
    let tool_calls_total = runs.iter().map(|r| r.tool_calls).sum();
    let cached_tool_calls_total = runs.iter().map(|r| r.cached_tool_calls).sum();
    let latencies: Vec<i64> = runs.iter().map(|r| r.latency_ms).collect();
    Aggregate { avg_quality, question_level_acc_rate, tool_calls_total, cached_tool_calls_total, p90_latency_ms: p90(&latencies) }
}

/// One config's full run: every step of every pass, plus the
/// aggregate computed over all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub config: MemoryMode,
    pub runs: Vec<StepOutcome>,
    pub aggregate: Aggregate,
}

/// `{scenario, summaries}` — the report file format (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub summaries: Vec<ConfigSummary>,
}

/// Builds a fresh `StateStore` per config (via `store_factory`) so
/// memory effects of one config never leak into another, then runs
/// `scenario.steps` in order, `repeat` times, threading session state
/// across steps within a pass but never across passes.
pub struct ScenarioRunner<F> {
    pub llm: Option<Arc<dyn LLMClient>>,
    pub dataset: Arc<dyn DatasetQuery>,
    pub clock: Arc<dyn Clock>,
    /// Builds a `StateStore` isolated to one config (e.g. a state path
    /// suffixed with the config name, per §5).
    pub store_factory: F,
    /// Invoked with every completed `Run`, in execution order, before
    /// it is collapsed into a `StepOutcome`. The CLI's run-log writer
    /// hooks in here; tests that don't care leave this `None`.
    pub on_run: Option<Box<dyn Fn(&Run) + Send + Sync>>,
}

impl<F> ScenarioRunner<F>
where
    F: Fn(MemoryMode) -> Arc<dyn StateStore>,
{
    pub async fn run(
        &self,
        scenario: &Scenario,
        user_id: &str,
        configs: &[MemoryMode],
        repeat: usize,
    ) -> Result<ScenarioReport, AnalystError> {
        let mut summaries = Vec::with_capacity(configs.len());
        for &mode in configs {
            let store = (self.store_factory)(mode);
            let orchestrator = Orchestrator::new(store, self.llm.clone(), self.dataset.clone(), self.clock.clone()).await?;

            let mut runs = Vec::new();
            for _ in 0..repeat {
                let mut session = SessionState::new();
                for step in &scenario.steps {
                    let config = OrchestratorConfig { memory_mode: mode, today_override: Some(scenario.today.clone()) };
                    let run = orchestrator.run(&step.query, user_id, config, session.clone()).await?;
                    session = run.session_after.clone();
                    if let Some(on_run) = &self.on_run {
                        on_run(&run);
                    }
                    let mut outcome = StepOutcome::from_run(&run);
                    outcome.step_id = step.id.clone();
                    runs.push(outcome);
                }
            }

            let aggregate = aggregate(&runs);
            summaries.push(ConfigSummary { config: mode, runs, aggregate });
        }

        Ok(ScenarioReport { scenario: scenario.id.clone(), summaries })
    }
}
