//! Arg coercion shared by the planner and the tool registry: metric
//! synonym resolution, snake_case key aliasing, and date-prefix
//! trimming, applied before per-tool schema validation.

use serde_json::{Map, Value};

use super::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Sales,
    Units,
    Sessions,
    ConversionRate,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Sales => "sales",
            Metric::Units => "units",
            Metric::Sessions => "sessions",
            Metric::ConversionRate => "conversion_rate",
        }
    }

    /// Resolves the metric domain plus the synonyms the planner and
    /// registry must both accept: `revenue|gmv` → sales,
    /// `traffic|visits|visit` → sessions, `conversion|cvr` →
    /// conversion_rate.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_lowercase().as_str() {
            "sales" | "revenue" | "gmv" => Metric::Sales,
            "units" => Metric::Units,
            "sessions" | "traffic" | "visits" | "visit" => Metric::Sessions,
            "conversion_rate" | "conversion" | "cvr" => Metric::ConversionRate,
            _ => return None,
        })
    }
}

fn trim_date_prefix(s: &str) -> String {
    s.chars().take(10).collect()
}

/// Renames a handful of snake_case aliases to the canonical camelCase
/// key before schema validation, and trims ISO timestamps to a bare
/// date. Caller-supplied canonical keys win over aliases if both are
/// present.
fn alias_keys(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut out = obj.clone();

    let aliases: &[(&str, &str)] = &[
        ("start_date", "startDate"),
        ("end_date", "endDate"),
        ("product_ids", "productIds"),
        ("n", "limit"),
        ("topN", "limit"),
        ("top_n", "limit"),
    ];
    for (alias, canonical) in aliases {
        if !out.contains_key(*canonical) {
            if let Some(v) = out.remove(*alias) {
                out.insert(canonical.to_string(), v);
            }
        } else {
            out.remove(*alias);
        }
    }

    if let Some(Value::String(s)) = out.get("startDate").cloned() {
        out.insert("startDate".to_string(), Value::String(trim_date_prefix(&s)));
    }
    if let Some(Value::String(s)) = out.get("endDate").cloned() {
        out.insert("endDate".to_string(), Value::String(trim_date_prefix(&s)));
    }
    if let Some(Value::String(g)) = out.get("grain").cloned() {
        if g == "daily" {
            out.insert("grain".to_string(), Value::String("day".to_string()));
        }
    }
    if let Some(Value::String(m)) = out.get("metric").cloned() {
        if let Some(resolved) = Metric::parse(&m) {
            out.insert("metric".to_string(), Value::String(resolved.as_str().to_string()));
        }
    }

    out
}

/// Applies key aliasing and synonym coercion to a tool's raw args
/// object. Per-tool shape/range validation happens in the caller
/// (executor or planner validation pass), which needs tool-specific
/// error messages.
pub fn coerce_args(tool: &str, args: &Value) -> Result<Value, ToolError> {
    let obj = args.as_object().ok_or_else(|| ToolError::InvalidArgs {
        tool: tool.to_string(),
        reason: "args must be a JSON object".to_string(),
    })?;
    Ok(Value::Object(alias_keys(obj)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metric_synonyms_resolve() {
        assert_eq!(Metric::parse("revenue"), Some(Metric::Sales));
        assert_eq!(Metric::parse("gmv"), Some(Metric::Sales));
        assert_eq!(Metric::parse("traffic"), Some(Metric::Sessions));
        assert_eq!(Metric::parse("cvr"), Some(Metric::ConversionRate));
    }

    #[test]
    fn snake_case_aliases_are_renamed() {
        let args = json!({"start_date": "2026-01-01", "end_date": "2026-01-31", "n": 10});
        let coerced = coerce_args("top_products", &args).unwrap();
        assert_eq!(coerced["startDate"], "2026-01-01");
        assert_eq!(coerced["endDate"], "2026-01-31");
        assert_eq!(coerced["limit"], 10);
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let args = json!({"limit": 5, "n": 20});
        let coerced = coerce_args("top_products", &args).unwrap();
        assert_eq!(coerced["limit"], 5);
    }

    #[test]
    fn daily_grain_normalizes_to_day() {
        let args = json!({"grain": "daily"});
        let coerced = coerce_args("timeseries", &args).unwrap();
        assert_eq!(coerced["grain"], "day");
    }

    #[test]
    fn date_with_time_component_is_trimmed() {
        let args = json!({"startDate": "2026-01-01T10:00:00Z"});
        let coerced = coerce_args("top_products", &args).unwrap();
        assert_eq!(coerced["startDate"], "2026-01-01");
    }
}
