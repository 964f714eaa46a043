//! The tool registry: typed definitions over the dataset, built once
//! behind a `OnceLock`, each pairing an arg-coercion/validation step
//! with an `execute` closure that calls into the injected
//! [`DatasetQuery`].

pub mod schema;

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use schema::{coerce_args, Metric};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid args for {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },
    #[error("dataset error: {0}")]
    Dataset(String),
}

/// A single point in a `timeseries` result.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimePoint {
    pub date: String,
    pub value: f64,
}

/// The dataset boundary the core consumes but does not own. The
/// reference implementation lives in the CLI binary (§6 of the spec
/// explicitly excludes the schema from the core).
#[async_trait]
pub trait DatasetQuery: Send + Sync {
    async fn list_products(&self, category: Option<&str>, limit: usize) -> Result<Value, ToolError>;

    async fn top_products(
        &self,
        metric: Metric,
        start_date: &str,
        end_date: &str,
        limit: usize,
    ) -> Result<Value, ToolError>;

    async fn timeseries(
        &self,
        metric: Metric,
        product_ids: &[i64],
        start_date: &str,
        end_date: &str,
    ) -> Result<Value, ToolError>;

    async fn benchmark(
        &self,
        metric: Metric,
        category: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Value, ToolError>;
}

/// `compute_changes` is pure arithmetic over caller-supplied points and
/// needs no dataset access.
pub fn compute_changes(points: &[TimePoint]) -> Result<Value, ToolError> {
    if points.len() < 2 {
        return Err(ToolError::InvalidArgs {
            tool: "compute_changes".to_string(),
            reason: "points must contain at least 2 entries".to_string(),
        });
    }
    let start_value = points.first().unwrap().value;
    let end_value = points.last().unwrap().value;
    let abs_change = end_value - start_value;
    let pct_change = if start_value == 0.0 {
        if end_value != 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        abs_change / start_value
    };
    Ok(serde_json::json!({
        "startValue": start_value,
        "endValue": end_value,
        "absChange": abs_change,
        "pctChange": pct_change,
    }))
}

pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub schema_doc: &'static str,
}

pub fn registry() -> &'static HashMap<&'static str, ToolDefinition> {
    static REGISTRY: OnceLock<HashMap<&'static str, ToolDefinition>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let defs = [
            ToolDefinition {
                name: "list_products",
                description: "List known products, optionally filtered by category.",
                schema_doc: "{category?: string, limit?: int <= 500}",
            },
            ToolDefinition {
                name: "top_products",
                description: "Rank products by a metric over a date range.",
                schema_doc: "{metric: string, startDate: date, endDate: date, limit: int 1..=100}",
            },
            ToolDefinition {
                name: "timeseries",
                description: "Per-product daily points for a metric over a date range.",
                schema_doc: "{metric: string, productIds: [int, >=1], startDate: date, endDate: date, grain: \"day\"}",
            },
            ToolDefinition {
                name: "benchmark",
                description: "Category average of a metric over a date range.",
                schema_doc: "{metric: string, category: string, startDate: date, endDate: date}",
            },
            ToolDefinition {
                name: "compute_changes",
                description: "Start/end/abs/pct change across a list of time points.",
                schema_doc: "{points: [{date, value}, >=2]}",
            },
        ];
        defs.into_iter().map(|d| (d.name, d)).collect()
    })
}

pub fn tool_exists(name: &str) -> bool {
    registry().contains_key(name)
}

fn is_iso_date(s: &str) -> bool {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap()).is_match(s)
}

/// Validates a tool's args object (already coerced by
/// [`coerce_args`]) against its shape. Called by both the planner's
/// LLM-candidate validation pass and the executor's final guard.
pub fn validate_args(tool: &str, args: &Value) -> Result<(), ToolError> {
    let invalid = |reason: &str| ToolError::InvalidArgs { tool: tool.to_string(), reason: reason.to_string() };
    let obj = args.as_object().ok_or_else(|| invalid("args must be an object"))?;

    match tool {
        "list_products" => {
            if let Some(limit) = obj.get("limit") {
                let n = limit.as_u64().ok_or_else(|| invalid("limit must be an integer"))?;
                if n > 500 {
                    return Err(invalid("limit must be <= 500"));
                }
            }
            Ok(())
        }
        "top_products" => {
            require_metric(obj, &invalid)?;
            require_dates(obj, &invalid)?;
            let limit = obj.get("limit").and_then(|v| v.as_u64()).ok_or_else(|| invalid("limit is required"))?;
            if !(1..=100).contains(&limit) {
                return Err(invalid("limit must be in 1..=100"));
            }
            Ok(())
        }
        "timeseries" => {
            require_metric(obj, &invalid)?;
            require_dates(obj, &invalid)?;
            let ids = obj.get("productIds").and_then(|v| v.as_array()).ok_or_else(|| invalid("productIds is required"))?;
            if ids.is_empty() {
                return Err(invalid("productIds must contain at least 1 entry"));
            }
            Ok(())
        }
        "benchmark" => {
            require_metric(obj, &invalid)?;
            require_dates(obj, &invalid)?;
            if !obj.get("category").map(|v| v.is_string()).unwrap_or(false) {
                return Err(invalid("category is required"));
            }
            Ok(())
        }
        "compute_changes" => {
            let points = obj.get("points").and_then(|v| v.as_array()).ok_or_else(|| invalid("points is required"))?;
            if points.len() < 2 {
                return Err(invalid("points must contain at least 2 entries"));
            }
            Ok(())
        }
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

fn require_metric(obj: &serde_json::Map<String, Value>, invalid: impl Fn(&str) -> ToolError) -> Result<(), ToolError> {
    let m = obj.get("metric").and_then(|v| v.as_str()).ok_or_else(|| invalid("metric is required"))?;
    if Metric::parse(m).is_none() {
        return Err(invalid("metric is not recognized"));
    }
    Ok(())
}

fn require_dates(obj: &serde_json::Map<String, Value>, invalid: impl Fn(&str) -> ToolError) -> Result<(), ToolError> {
    let start = obj.get("startDate").and_then(|v| v.as_str()).ok_or_else(|| invalid("startDate is required"))?;
    let end = obj.get("endDate").and_then(|v| v.as_str()).ok_or_else(|| invalid("endDate is required"))?;
    if !is_iso_date(start) || !is_iso_date(end) {
        return Err(invalid("startDate/endDate must be ISO YYYY-MM-DD"));
    }
    Ok(())
}

/// A human-readable dump of the registry for the planner's prompt.
pub fn registry_prompt_doc() -> String {
    let mut regs: Vec<_> = registry().values().collect();
    regs.sort_by_key(|d| d.name);
    regs.iter()
        .map(|d| format!("- {}({}): {}", d.name, d.schema_doc, d.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_changes_handles_zero_start_nonzero_end() {
        let points = [TimePoint { date: "2026-01-01".into(), value: 0.0 }, TimePoint { date: "2026-01-02".into(), value: 5.0 }];
        let result = compute_changes(&points).unwrap();
        assert_eq!(result["pctChange"], 1.0);
    }

    #[test]
    fn compute_changes_handles_zero_to_zero() {
        let points = [TimePoint { date: "2026-01-01".into(), value: 0.0 }, TimePoint { date: "2026-01-02".into(), value: 0.0 }];
        let result = compute_changes(&points).unwrap();
        assert_eq!(result["pctChange"], 0.0);
    }

    #[test]
    fn all_five_tools_are_registered() {
        for name in ["list_products", "top_products", "timeseries", "benchmark", "compute_changes"] {
            assert!(tool_exists(name), "{name} missing from registry");
        }
    }
}
