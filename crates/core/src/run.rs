//! The `Run` record and its constituents: config, plan, tool-call log,
//! and the per-run evaluation result. A `Run` is append-only once
//! recorded by the orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evaluator::EvalResult;
use crate::memory::MemoryItem;
use crate::session::SessionState;

/// Memory configuration for a run, threaded through the orchestrator
/// and the scenario runner's per-config store isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    /// No retrieval, no writes, no tool caching.
    Baseline,
    /// Retrieval only; no writes, no caching.
    Read,
    /// Retrieval and writes; no caching.
    Readwrite,
    /// Retrieval, writes, and tool-result caching.
    ReadwriteCache,
}

impl MemoryMode {
    pub fn retrieval_enabled(self) -> bool {
        !matches!(self, MemoryMode::Baseline)
    }

    pub fn writes_enabled(self) -> bool {
        matches!(self, MemoryMode::Readwrite | MemoryMode::ReadwriteCache)
    }

    pub fn caching_enabled(self) -> bool {
        matches!(self, MemoryMode::ReadwriteCache)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryMode::Baseline => "baseline",
            MemoryMode::Read => "read",
            MemoryMode::Readwrite => "readwrite",
            MemoryMode::ReadwriteCache => "readwrite_cache",
        }
    }
}

/// Per-run configuration snapshot, recorded verbatim on the `Run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub memory_mode: MemoryMode,
    /// Overrides `Clock::today()` for this run, per §6 "today may be
    /// overridden per-run via config".
    pub today_override: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { memory_mode: MemoryMode::Baseline, today_override: None }
    }
}

/// A single planned tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_date: String,
    pub end_date: String,
}

/// `{ route, timeRange?, steps, notes? }` — the planner's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub route: String,
    pub time_range: Option<TimeRange>,
    pub steps: Vec<PlanStep>,
    pub notes: Option<String>,
}

/// One executed tool call, as logged by the Executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: Value,
    pub signature: String,
    pub cached: bool,
    pub started_at: String,
    pub duration_ms: i64,
    pub result: Value,
}

/// Per-stage wall-clock durations recorded on every run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Latencies {
    pub manager_route_ms: i64,
    pub worker_total_ms: i64,
    pub eval_ms: i64,
}

/// The full execution record of one query, persisted append-only by
/// the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub created_at: String,
    pub user_id: String,
    pub config: OrchestratorConfig,
    pub query: String,
    pub augmented_query: String,
    pub route: Option<String>,
    pub ood: bool,
    pub plan: Option<Plan>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub response: String,
    pub eval: Option<EvalResult>,
    pub latencies: Latencies,
    pub memory_injected: Vec<MemoryItem>,
    #[serde(skip)]
    pub session_after: SessionState,
}
