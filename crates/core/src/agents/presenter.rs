//! Deterministic rendering of a plan's execution results. No LLM
//! involved — the spec excludes natural-language generation from this
//! path (§1 Non-goals).

use crate::executor::ExecutionOutcome;
use crate::run::Plan;
use crate::session::SessionState;

use super::{first_result, AgentOutcome};

const MAX_SELECTED_PRODUCTS: usize = 20;

fn render_top_products(result: &serde_json::Value, time_range: Option<&crate::run::TimeRange>) -> String {
    let rows = result.get("rows").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    if rows.is_empty() {
        return "No results.".to_string();
    }

    let header = match time_range {
        Some(r) => format!("Top products ({} to {}):", r.start_date, r.end_date),
        None => "Top products:".to_string(),
    };

    let mut lines = vec![header];
    for (i, row) in rows.iter().enumerate() {
        let name = row.get("productName").and_then(|v| v.as_str()).unwrap_or("unknown");
        let value = row.get("metricValue").and_then(|v| v.as_f64()).unwrap_or(0.0);
        lines.push(format!("{}. {} — {:.2}", i + 1, name, value));
    }
    lines.join("\n")
}

fn render_timeseries(result: &serde_json::Value) -> String {
    let series = result.get("series").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    if series.is_empty() {
        return "No results.".to_string();
    }

    let mut lines = vec!["Per-product summary:".to_string()];
    for entry in &series {
        let product_id = entry.get("productId").and_then(|v| v.as_i64()).unwrap_or(0);
        let last_value = entry
            .get("points")
            .and_then(|v| v.as_array())
            .and_then(|points| points.last())
            .and_then(|p| p.get("value"))
            .and_then(|v| v.as_f64());
        match last_value {
            Some(v) => lines.push(format!("Product {product_id}: last value {v:.2}")),
            None => lines.push(format!("Product {product_id}: no data returned")),
        }
    }
    lines.join("\n")
}

fn render_products(result: &serde_json::Value) -> String {
    let products = result.get("products").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    if products.is_empty() {
        return "No results.".to_string();
    }
    let mut lines = vec!["Products:".to_string()];
    for p in &products {
        let name = p.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
        lines.push(format!("- {name}"));
    }
    lines.join("\n")
}

/// Renders the executor's output and, when a `top_products` result is
/// present, updates `session.selectedProductIds` with up to the first
/// 20 product ids (read by the planner's "those products" branch).
pub fn present(plan: &Plan, outcome: &ExecutionOutcome, mut session: SessionState) -> AgentOutcome {
    if let Some(result) = first_result(outcome, "top_products") {
        let response = render_top_products(result, plan.time_range.as_ref());
        let ids: Vec<i64> = result
            .get("rows")
            .and_then(|v| v.as_array())
            .map(|rows| rows.iter().filter_map(|r| r.get("productId").and_then(|v| v.as_i64())).take(MAX_SELECTED_PRODUCTS).collect())
            .unwrap_or_default();
        session.selected_product_ids = ids;
        return AgentOutcome { response, session };
    }

    if let Some(result) = first_result(outcome, "timeseries") {
        return AgentOutcome { response: render_timeseries(result), session };
    }

    if let Some(result) = first_result(outcome, "list_products") {
        return AgentOutcome { response: render_products(result), session };
    }

    AgentOutcome { response: "No results.".to_string(), session }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{PlanStep, TimeRange};
    use std::collections::HashMap;

    fn outcome_with(tool: &str, result: serde_json::Value) -> ExecutionOutcome {
        ExecutionOutcome { tool_calls: vec![], results_by_tool: HashMap::from([(tool.to_string(), result)]) }
    }

    #[test]
    fn top_products_sets_selected_ids() {
        let plan = Plan {
            route: "data_presenter".to_string(),
            time_range: Some(TimeRange { start_date: "2026-01-01".into(), end_date: "2026-01-31".into() }),
            steps: vec![PlanStep { tool: "top_products".to_string(), args: serde_json::json!({}) }],
            notes: None,
        };
        let result = serde_json::json!({"rows": [
            {"productId": 1, "productName": "A", "metricValue": 10.0},
            {"productId": 2, "productName": "B", "metricValue": 8.0}
        ]});
        let outcome = outcome_with("top_products", result);
        let out = present(&plan, &outcome, SessionState::default());
        assert_eq!(out.session.selected_product_ids, vec![1, 2]);
        assert!(out.response.contains("Top products"));
    }

    #[test]
    fn empty_rows_yields_no_results() {
        let plan = Plan { route: "data_presenter".to_string(), time_range: None, steps: vec![], notes: None };
        let outcome = outcome_with("top_products", serde_json::json!({"rows": []}));
        let out = present(&plan, &outcome, SessionState::default());
        assert_eq!(out.response, "No results.");
    }

    #[test]
    fn no_tool_results_yields_no_results() {
        let plan = Plan { route: "data_presenter".to_string(), time_range: None, steps: vec![], notes: None };
        let outcome = ExecutionOutcome { tool_calls: vec![], results_by_tool: HashMap::new() };
        let out = present(&plan, &outcome, SessionState::default());
        assert_eq!(out.response, "No results.");
    }
}
