//! LLM-driven plan production with a deterministic heuristic fallback.
//! [`parse`] implements the brace-balanced free-form-text scanner;
//! [`heuristic`] implements the rule-based fallback builder.

pub mod heuristic;
pub mod parse;

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::clock::TimeContext;
use crate::llm::{CompletionRequest, LLMClient};
use crate::memory::MemoryItem;
use crate::run::{Plan, PlanStep, TimeRange};
use crate::session::SessionState;
use crate::tools::{coerce_args, registry_prompt_doc, tool_exists, validate_args, ToolError};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Input to [`plan`]: the routed query plus everything the prompt (or
/// the heuristic) needs.
pub struct PlanRequest<'a> {
    pub route: &'a str,
    pub query: &'a str,
    pub augmented_query: &'a str,
    pub time_context: &'a TimeContext,
    pub session: &'a SessionState,
    pub memory_cards: &'a [String],
}

pub struct PlanResult {
    pub plan: Plan,
    pub raw_text: Option<String>,
    pub used_fallback: bool,
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

fn build_prompt(req: &PlanRequest) -> String {
    let mut out = String::new();
    out.push_str("OUTPUT_JSON_PLAN\n\n");
    out.push_str("You are a planner for a seller-analytics assistant. Produce a single JSON object\n");
    out.push_str("shaped { \"route\": string, \"timeRange\"?: {\"startDate\", \"endDate\"}, \"steps\": [{\"tool\", \"args\"}], \"notes\"?: string }.\n\n");
    out.push_str("Available tools:\n");
    out.push_str(&registry_prompt_doc());
    out.push_str("\n\n");
    out.push_str(&format!("Route: {}\n", req.route));
    out.push_str(&format!("Today: {}\n", req.time_context.today));
    if !req.session.selected_product_ids.is_empty() {
        out.push_str(&format!("Session selectedProductIds: {:?}\n", req.session.selected_product_ids));
    }
    if !req.memory_cards.is_empty() {
        out.push_str("\nRelevant memory:\n");
        for card in req.memory_cards {
            out.push_str(card);
            out.push('\n');
        }
    }
    out.push_str(&format!("\nQuery: {}\nAugmented query: {}\n", req.query, req.augmented_query));
    out
}

fn validate_plan_shape(value: &Value) -> Option<Plan> {
    let obj = value.as_object()?;
    let route = obj.get("route")?.as_str()?.to_string();
    let steps_raw = obj.get("steps")?.as_array()?;
    if steps_raw.is_empty() {
        return None;
    }

    let mut steps = Vec::new();
    for step in steps_raw {
        let tool = step.get("tool")?.as_str()?.to_string();
        if !tool_exists(&tool) {
            return None;
        }
        let raw_args = step.get("args").cloned().unwrap_or(Value::Object(Default::default()));
        let coerced = coerce_args(&tool, &raw_args).ok()?;
        validate_args(&tool, &coerced).ok()?;
        steps.push(PlanStep { tool, args: coerced });
    }

    let time_range = match obj.get("timeRange") {
        Some(Value::Object(tr)) => {
            let start = tr.get("startDate")?.as_str()?.to_string();
            let end = tr.get("endDate")?.as_str()?.to_string();
            if !iso_date_re().is_match(&start) || !iso_date_re().is_match(&end) {
                return None;
            }
            Some(TimeRange { start_date: start, end_date: end })
        }
        _ => None,
    };

    let notes = obj.get("notes").and_then(|v| v.as_str()).map(|s| s.to_string());

    Some(Plan { route, time_range, steps, notes })
}

/// Tries each balanced-brace candidate in order, validating full plan
/// shape + per-step schema. Returns the first plan that validates.
fn try_parse_candidates(raw_text: &str) -> Option<Plan> {
    for candidate in parse::extract_json_candidates(raw_text) {
        let cleaned = parse::strip_trailing_commas(&candidate);
        let Ok(value) = serde_json::from_str::<Value>(&cleaned) else { continue };
        if let Some(plan) = validate_plan_shape(&value) {
            return Some(plan);
        }
    }
    None
}

#[instrument(skip(req, llm), fields(route = req.route))]
pub async fn plan(req: PlanRequest<'_>, llm: Option<&dyn LLMClient>) -> Result<PlanResult, PlannerError> {
    if let Some(llm) = llm {
        let prompt = build_prompt(&req);
        match llm.complete(CompletionRequest::single_turn("Return only the JSON plan object.", prompt)).await {
            Ok(resp) => {
                if let Some(plan) = try_parse_candidates(&resp.text) {
                    return Ok(PlanResult { plan, raw_text: Some(resp.text), used_fallback: false });
                }
                debug!("planner: no LLM candidate validated, falling back to heuristic");
            }
            Err(e) => {
                debug!(error = %e, "planner: LLM transport error, falling back to heuristic");
            }
        }
    }

    let plan = heuristic::build_plan(req.route, req.query, req.time_context, req.session);
    Ok(PlanResult { plan, raw_text: None, used_fallback: true })
}

/// Injects memory cards from a slice of [`MemoryItem`]s into the
/// retrieval-query body the orchestrator already rendered elsewhere;
/// kept here only as a convenience for callers that have raw items
/// rather than pre-rendered card text.
pub fn card_texts(items: &[MemoryItem]) -> Vec<String> {
    items.iter().map(|i| i.text.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::time_context_for;

    fn ctx() -> TimeContext {
        time_context_for(chrono::NaiveDate::from_ymd_opt(2026, 2, 4).unwrap())
    }

    #[tokio::test]
    async fn no_llm_uses_heuristic() {
        let session = SessionState::default();
        let req = PlanRequest {
            route: "data_presenter",
            query: "top 10 products by sales last month",
            augmented_query: "top 10 products by sales last month",
            time_context: &ctx(),
            session: &session,
            memory_cards: &[],
        };
        let result = plan(req, None).await.unwrap();
        assert!(result.used_fallback);
        assert_eq!(result.plan.steps[0].tool, "top_products");
    }

    #[test]
    fn validate_plan_shape_rejects_unknown_tool() {
        let value = serde_json::json!({"route": "data_presenter", "steps": [{"tool": "nonexistent", "args": {}}]});
        assert!(validate_plan_shape(&value).is_none());
    }

    #[test]
    fn validate_plan_shape_rejects_missing_steps() {
        let value = serde_json::json!({"route": "data_presenter", "steps": []});
        assert!(validate_plan_shape(&value).is_none());
    }

    #[test]
    fn validate_plan_shape_accepts_well_formed_plan() {
        let value = serde_json::json!({
            "route": "data_presenter",
            "steps": [{"tool": "top_products", "args": {"metric": "sales", "startDate": "2026-01-01", "endDate": "2026-01-31", "limit": 10}}]
        });
        assert!(validate_plan_shape(&value).is_some());
    }
}
