//! An in-memory, seeded `DatasetQuery` reference implementation. Lives
//! in the testing module (not the CLI) so both unit tests and the
//! scenario integration tests can construct it directly; the CLI's
//! `src/dataset.rs` is a thin wrapper that seeds the same generator
//! for real runs.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde_json::Value;

use crate::tools::{DatasetQuery, Metric, ToolError};

#[derive(Debug, Clone)]
struct Product {
    id: i64,
    name: String,
    category: String,
}

const CATEGORIES: &[&str] = &["apparel", "home", "electronics", "beauty"];

fn products() -> Vec<Product> {
    (1..=20)
        .map(|i| Product { id: i, name: format!("Product {i}"), category: CATEGORIES[(i as usize - 1) % CATEGORIES.len()].to_string() })
        .collect()
}

/// A small deterministic pseudo-random generator (xorshift-style) so
/// the same `(seed, product, day, metric)` tuple always yields the
/// same value, regardless of call order.
fn hash_u64(seed: u64, a: u64, b: u64) -> u64 {
    let mut x = seed ^ (a.wrapping_mul(0x9E3779B97F4A7C15)) ^ (b.wrapping_mul(0xC2B2AE3D27D4EB4F));
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51afd7ed558ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ceb9fe1a85ec53);
    x ^= x >> 33;
    x
}

fn parse(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap_or_else(|_| NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
}

fn date_range(start: &str, end: &str) -> Vec<NaiveDate> {
    let start = parse(start);
    let end = parse(end);
    let mut out = Vec::new();
    let mut d = start;
    while d <= end {
        out.push(d);
        d += Duration::days(1);
    }
    out
}

pub struct FakeDataset {
    seed: u64,
    day_count: i64,
    start_date: NaiveDate,
}

impl FakeDataset {
    pub fn seeded(seed: u64, day_count: i64, start_date: &str) -> Self {
        Self { seed, day_count, start_date: parse(start_date) }
    }

    fn day_index(&self, date: NaiveDate) -> i64 {
        (date - self.start_date).num_days()
    }

    fn in_seeded_range(&self, date: NaiveDate) -> bool {
        let idx = self.day_index(date);
        idx >= 0 && idx < self.day_count
    }

    fn sessions(&self, product_id: i64, date: NaiveDate) -> f64 {
        if !self.in_seeded_range(date) {
            return 0.0;
        }
        let h = hash_u64(self.seed, product_id as u64, self.day_index(date) as u64 ^ 1);
        50.0 + (h % 500) as f64
    }

    fn units(&self, product_id: i64, date: NaiveDate) -> f64 {
        if !self.in_seeded_range(date) {
            return 0.0;
        }
        let h = hash_u64(self.seed, product_id as u64, self.day_index(date) as u64 ^ 2);
        1.0 + (h % 30) as f64
    }

    fn sales(&self, product_id: i64, date: NaiveDate) -> f64 {
        let h = hash_u64(self.seed, product_id as u64, self.day_index(date) as u64 ^ 3);
        let price = 10.0 + (h % 40) as f64;
        self.units(product_id, date) * price
    }

    fn conversion_rate(&self, product_id: i64, date: NaiveDate) -> f64 {
        let sessions = self.sessions(product_id, date);
        if sessions == 0.0 {
            0.0
        } else {
            self.units(product_id, date) / sessions
        }
    }

    fn metric_value(&self, metric: Metric, product_id: i64, date: NaiveDate) -> f64 {
        match metric {
            Metric::Sales => self.sales(product_id, date),
            Metric::Units => self.units(product_id, date),
            Metric::Sessions => self.sessions(product_id, date),
            Metric::ConversionRate => self.conversion_rate(product_id, date),
        }
    }

    fn metric_sum(&self, metric: Metric, product_id: i64, start: &str, end: &str) -> f64 {
        date_range(start, end).into_iter().map(|d| self.metric_value(metric, product_id, d)).sum()
    }
}

#[async_trait]
impl DatasetQuery for FakeDataset {
    async fn list_products(&self, category: Option<&str>, limit: usize) -> Result<Value, ToolError> {
        let rows: Vec<Value> = products()
            .into_iter()
            .filter(|p| category.map(|c| p.category == c).unwrap_or(true))
            .take(limit)
            .map(|p| serde_json::json!({"id": p.id, "name": p.name, "category": p.category}))
            .collect();
        Ok(serde_json::json!({"products": rows}))
    }

    async fn top_products(&self, metric: Metric, start_date: &str, end_date: &str, limit: usize) -> Result<Value, ToolError> {
        let mut rows: Vec<(Product, f64)> =
            products().into_iter().map(|p| {
                let value = self.metric_sum(metric, p.id, start_date, end_date);
                (p, value)
            }).collect();
        rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        rows.truncate(limit);

        let rows: Vec<Value> = rows
            .into_iter()
            .map(|(p, value)| serde_json::json!({"productId": p.id, "productName": p.name, "metric": metric.as_str(), "metricValue": value}))
            .collect();
        Ok(serde_json::json!({"rows": rows}))
    }

    async fn timeseries(&self, metric: Metric, product_ids: &[i64], start_date: &str, end_date: &str) -> Result<Value, ToolError> {
        let dates = date_range(start_date, end_date);
        let series: Vec<Value> = product_ids
            .iter()
            .map(|&id| {
                let points: Vec<Value> = dates
                    .iter()
                    .map(|&d| serde_json::json!({"date": d.format("%Y-%m-%d").to_string(), "value": self.metric_value(metric, id, d)}))
                    .collect();
                serde_json::json!({"productId": id, "points": points})
            })
            .collect();
        Ok(serde_json::json!({"series": series}))
    }

    async fn benchmark(&self, metric: Metric, category: &str, start_date: &str, end_date: &str) -> Result<Value, ToolError> {
        let matching: Vec<Product> = products().into_iter().filter(|p| p.category == category).collect();
        if matching.is_empty() {
            return Ok(serde_json::json!({"average": 0.0}));
        }
        let dates = date_range(start_date, end_date);
        let total: f64 = matching.iter().map(|p| self.metric_sum(metric, p.id, start_date, end_date)).sum();
        let average = total / (matching.len() as f64 * dates.len().max(1) as f64);
        Ok(serde_json::json!({"average": average}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn top_products_is_sorted_descending() {
        let dataset = FakeDataset::seeded(42, 120, "2025-10-01");
        let result = dataset.top_products(Metric::Sales, "2026-01-01", "2026-01-31", 5).await.unwrap();
        let rows = result["rows"].as_array().unwrap();
        for pair in rows.windows(2) {
            assert!(pair[0]["metricValue"].as_f64().unwrap() >= pair[1]["metricValue"].as_f64().unwrap());
        }
    }

    #[tokio::test]
    async fn same_query_is_deterministic() {
        let dataset = FakeDataset::seeded(42, 120, "2025-10-01");
        let a = dataset.top_products(Metric::Sales, "2026-01-01", "2026-01-31", 5).await.unwrap();
        let b = dataset.top_products(Metric::Sales, "2026-01-01", "2026-01-31", 5).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn timeseries_returns_one_series_per_product() {
        let dataset = FakeDataset::seeded(42, 120, "2025-10-01");
        let result = dataset.timeseries(Metric::Sessions, &[1, 2, 3], "2026-01-01", "2026-01-07").await.unwrap();
        assert_eq!(result["series"].as_array().unwrap().len(), 3);
    }
}
