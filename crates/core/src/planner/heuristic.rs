//! Deterministic rule-based plan builder, used when no LLM is
//! configured or when every parsed candidate fails validation.

use regex::Regex;
use std::sync::OnceLock;

use crate::clock::TimeContext;
use crate::run::{Plan, PlanStep, TimeRange};
use crate::session::SessionState;
use crate::tools::Metric;

fn top_n_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)top\s+(\d+)").unwrap())
}

fn why_drop_wow_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)why.*drop.*wow|wow.*drop.*why|why.*wow.*drop").unwrap())
}

fn top_products_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)top.*products?").unwrap())
}

fn detect_metric(query: &str) -> Metric {
    let q = query.to_lowercase();
    if q.contains("traffic") || q.contains("sessions") {
        Metric::Sessions
    } else if q.contains("conversion") {
        Metric::ConversionRate
    } else if q.contains("units") {
        Metric::Units
    } else {
        Metric::Sales
    }
}

fn detect_limit(query: &str) -> usize {
    top_n_re()
        .captures(query)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .unwrap_or(10)
}

/// Detects `this|last week|month` phrases; defaults to last month per
/// §4.4.
fn detect_range(query: &str, ctx: &TimeContext) -> TimeRange {
    let q = query.to_lowercase();
    if q.contains("this week") {
        TimeRange { start_date: ctx.this_week_start.clone(), end_date: ctx.this_week_end.clone() }
    } else if q.contains("last week") {
        TimeRange { start_date: ctx.last_week_start.clone(), end_date: ctx.last_week_end.clone() }
    } else if q.contains("this month") {
        TimeRange { start_date: ctx.this_month_start.clone(), end_date: ctx.this_month_end.clone() }
    } else {
        TimeRange { start_date: ctx.last_month_start.clone(), end_date: ctx.last_month_end.clone() }
    }
}

fn args(pairs: &[(&str, serde_json::Value)]) -> serde_json::Value {
    serde_json::Value::Object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

pub fn build_plan(route: &str, query: &str, ctx: &TimeContext, session: &SessionState) -> Plan {
    let q = query.to_lowercase();

    if q.contains("those products") && !session.selected_product_ids.is_empty() {
        let range = detect_range(&q, ctx);
        let metric = detect_metric(&q);
        let step = PlanStep {
            tool: "timeseries".to_string(),
            args: args(&[
                ("metric", serde_json::json!(metric.as_str())),
                ("productIds", serde_json::json!(session.selected_product_ids)),
                ("startDate", serde_json::json!(range.start_date)),
                ("endDate", serde_json::json!(range.end_date)),
                ("grain", serde_json::json!("day")),
            ]),
        };
        return Plan { route: route.to_string(), time_range: Some(range), steps: vec![step], notes: None };
    }

    if why_drop_wow_re().is_match(&q) {
        let this_week = TimeRange { start_date: ctx.this_week_start.clone(), end_date: ctx.this_week_end.clone() };
        let last_week = TimeRange { start_date: ctx.last_week_start.clone(), end_date: ctx.last_week_end.clone() };
        let mut steps = Vec::new();
        for metric in [Metric::Sales, Metric::Sessions, Metric::Units] {
            for range in [&this_week, &last_week] {
                steps.push(PlanStep {
                    tool: "top_products".to_string(),
                    args: args(&[
                        ("metric", serde_json::json!(metric.as_str())),
                        ("startDate", serde_json::json!(range.start_date)),
                        ("endDate", serde_json::json!(range.end_date)),
                        ("limit", serde_json::json!(50)),
                    ]),
                });
            }
        }
        return Plan {
            route: route.to_string(),
            time_range: Some(this_week.clone()),
            steps,
            notes: Some("why-drop-wow comparison".to_string()),
        };
    }

    if top_products_re().is_match(&q) {
        let range = detect_range(&q, ctx);
        let metric = detect_metric(&q);
        let limit = detect_limit(&q);
        let step = PlanStep {
            tool: "top_products".to_string(),
            args: args(&[
                ("metric", serde_json::json!(metric.as_str())),
                ("startDate", serde_json::json!(range.start_date)),
                ("endDate", serde_json::json!(range.end_date)),
                ("limit", serde_json::json!(limit)),
            ]),
        };
        return Plan { route: route.to_string(), time_range: Some(range), steps: vec![step], notes: None };
    }

    Plan {
        route: route.to_string(),
        time_range: None,
        steps: vec![PlanStep { tool: "list_products".to_string(), args: args(&[("limit", serde_json::json!(20))]) }],
        notes: None,
    }
}
