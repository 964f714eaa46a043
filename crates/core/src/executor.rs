//! Sequential plan execution with signature-keyed tool-result
//! caching. Grounded in the teacher's `reasoning/executor.rs`
//! dispatch-and-collect shape, simplified to sequential execution per
//! the concurrency model (the teacher's version dispatches in
//! parallel; tool calls here must run in plan order since later steps
//! may depend on earlier `compute_changes` inputs in spirit, and the
//! spec requires strict array-order execution).

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::run::{Plan, ToolCallRecord};
use crate::signature::signature;
use crate::store::StateStore;
use crate::tools::{compute_changes, validate_args, DatasetQuery, Metric, TimePoint, ToolError};

const MAX_STEPS: usize = 6;
const CACHE_NAMESPACE: &str = "tool_cache";

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

pub struct ExecutionOutcome {
    pub tool_calls: Vec<ToolCallRecord>,
    pub results_by_tool: HashMap<String, Value>,
}

async fn invoke_tool(dataset: &dyn DatasetQuery, tool: &str, args: &Value) -> Result<Value, ExecutorError> {
    validate_args(tool, args)?;
    match tool {
        "list_products" => {
            let category = args.get("category").and_then(|v| v.as_str());
            let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(500) as usize;
            Ok(dataset.list_products(category, limit).await?)
        }
        "top_products" => {
            let metric = Metric::parse(args["metric"].as_str().unwrap_or("sales")).unwrap_or(Metric::Sales);
            let start = args["startDate"].as_str().unwrap_or_default();
            let end = args["endDate"].as_str().unwrap_or_default();
            let limit = args["limit"].as_u64().unwrap_or(10) as usize;
            Ok(dataset.top_products(metric, start, end, limit).await?)
        }
        "timeseries" => {
            let metric = Metric::parse(args["metric"].as_str().unwrap_or("sales")).unwrap_or(Metric::Sales);
            let ids: Vec<i64> = args["productIds"].as_array().map(|a| a.iter().filter_map(|v| v.as_i64()).collect()).unwrap_or_default();
            let start = args["startDate"].as_str().unwrap_or_default();
            let end = args["endDate"].as_str().unwrap_or_default();
            Ok(dataset.timeseries(metric, &ids, start, end).await?)
        }
        "benchmark" => {
            let metric = Metric::parse(args["metric"].as_str().unwrap_or("sales")).unwrap_or(Metric::Sales);
            let category = args["category"].as_str().unwrap_or_default();
            let start = args["startDate"].as_str().unwrap_or_default();
            let end = args["endDate"].as_str().unwrap_or_default();
            Ok(dataset.benchmark(metric, category, start, end).await?)
        }
        "compute_changes" => {
            let points: Vec<TimePoint> = args["points"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|p| {
                            Some(TimePoint { date: p.get("date")?.as_str()?.to_string(), value: p.get("value")?.as_f64()? })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(compute_changes(&points)?)
        }
        other => Err(ExecutorError::Tool(ToolError::UnknownTool(other.to_string()))),
    }
}

/// Executes the first `min(6, plan.steps.len())` steps in order.
#[instrument(skip(plan, dataset, store), fields(steps = plan.steps.len()))]
pub async fn execute(
    plan: &Plan,
    dataset: &dyn DatasetQuery,
    store: Option<&dyn StateStore>,
    caching_enabled: bool,
    now_iso: &str,
) -> Result<ExecutionOutcome, ExecutorError> {
    let mut tool_calls = Vec::new();
    let mut results_by_tool = HashMap::new();

    for step in plan.steps.iter().take(MAX_STEPS) {
        let sig = signature(Some(CACHE_NAMESPACE), &step.tool, &step.args);
        let started = std::time::Instant::now();

        let (result, cached) = if caching_enabled {
            if let Some(store) = store {
                match store.get_tool_cache(&sig).await {
                    Ok(Some(entry)) => (entry.result, true),
                    Ok(None) => {
                        let result = invoke_tool(dataset, &step.tool, &step.args).await?;
                        if let Err(e) = store.set_tool_cache(&step.tool, &sig, &step.args, &result, now_iso).await {
                            warn!(error = %e, "tool cache write failed");
                        }
                        (result, false)
                    }
                    Err(e) => {
                        warn!(error = %e, "tool cache read failed, invoking tool");
                        (invoke_tool(dataset, &step.tool, &step.args).await?, false)
                    }
                }
            } else {
                (invoke_tool(dataset, &step.tool, &step.args).await?, false)
            }
        } else {
            (invoke_tool(dataset, &step.tool, &step.args).await?, false)
        };

        let duration_ms = started.elapsed().as_millis() as i64;
        results_by_tool.insert(step.tool.clone(), result.clone());
        tool_calls.push(ToolCallRecord {
            tool: step.tool.clone(),
            args: step.args.clone(),
            signature: sig,
            cached,
            started_at: now_iso.to_string(),
            duration_ms,
            result,
        });
    }

    Ok(ExecutionOutcome { tool_calls, results_by_tool })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::PlanStep;
    use async_trait::async_trait;

    struct StubDataset;

    #[async_trait]
    impl DatasetQuery for StubDataset {
        async fn list_products(&self, _category: Option<&str>, _limit: usize) -> Result<Value, ToolError> {
            Ok(serde_json::json!({"products": []}))
        }
        async fn top_products(&self, _metric: Metric, _start: &str, _end: &str, _limit: usize) -> Result<Value, ToolError> {
            Ok(serde_json::json!({"rows": []}))
        }
        async fn timeseries(&self, _metric: Metric, _ids: &[i64], _start: &str, _end: &str) -> Result<Value, ToolError> {
            Ok(serde_json::json!({"series": []}))
        }
        async fn benchmark(&self, _metric: Metric, _category: &str, _start: &str, _end: &str) -> Result<Value, ToolError> {
            Ok(serde_json::json!({"average": 0.0}))
        }
    }

    fn plan_with_steps(n: usize) -> Plan {
        Plan {
            route: "data_presenter".to_string(),
            time_range: None,
            steps: (0..n)
                .map(|_| PlanStep {
                    tool: "top_products".to_string(),
                    args: serde_json::json!({"metric": "sales", "startDate": "2026-01-01", "endDate": "2026-01-31", "limit": 10}),
                })
                .collect(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn caps_at_six_steps() {
        let dataset = StubDataset;
        let plan = plan_with_steps(9);
        let outcome = execute(&plan, &dataset, None, false, "2026-02-04T00:00:00Z").await.unwrap();
        assert_eq!(outcome.tool_calls.len(), 6);
    }

    #[tokio::test]
    async fn results_by_tool_is_last_wins() {
        let dataset = StubDataset;
        let mut plan = plan_with_steps(1);
        plan.steps.push(PlanStep {
            tool: "top_products".to_string(),
            args: serde_json::json!({"metric": "units", "startDate": "2026-01-01", "endDate": "2026-01-31", "limit": 5}),
        });
        let outcome = execute(&plan, &dataset, None, false, "2026-02-04T00:00:00Z").await.unwrap();
        assert_eq!(outcome.tool_calls.len(), 2);
        assert_eq!(outcome.results_by_tool.len(), 1);
    }

    #[tokio::test]
    async fn caching_disabled_never_touches_store() {
        let dataset = StubDataset;
        let plan = plan_with_steps(1);
        let outcome = execute(&plan, &dataset, None, false, "2026-02-04T00:00:00Z").await.unwrap();
        assert!(!outcome.tool_calls[0].cached);
    }
}
