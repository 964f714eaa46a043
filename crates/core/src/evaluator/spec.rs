//! Ground-truth spec inference from query text. The Evaluator
//! re-derives its own understanding of the query rather than trusting
//! the planner's chosen plan.

use std::sync::OnceLock;

use regex::Regex;

use crate::tools::Metric;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvalSpec {
    TopProducts { metric: Metric, limit: usize },
    Timeseries,
    WhyDropWow,
}

fn top_n_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)top\s+(\d+)").unwrap())
}

fn why_drop_wow_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)why.*drop.*wow|wow.*drop.*why|why.*wow.*drop").unwrap())
}

fn has_range_phrase(q: &str) -> bool {
    q.contains("last month") || q.contains("this month") || q.contains("last week")
}

fn detect_metric(q: &str) -> Metric {
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

/// Infers an [`EvalSpec`] from the query text, or `None` if nothing
/// matches (no score for this run).
pub fn infer_spec(query: &str) -> Option<EvalSpec> {
    let q = query.to_lowercase();

    if why_drop_wow_re().is_match(&q) {
        return Some(EvalSpec::WhyDropWow);
    }

    if (q.contains("traffic") || q.contains("sessions")) && q.contains("those products") {
        return Some(EvalSpec::Timeseries);
    }

    if q.contains("top") && q.contains("product") && has_range_phrase(&q) {
        let metric = detect_metric(&q);
        let limit = top_n_re().captures(&q).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse::<usize>().ok()).unwrap_or(10).min(100);
        return Some(EvalSpec::TopProducts { metric, limit });
    }

    None
}
