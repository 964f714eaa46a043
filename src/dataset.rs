//! The `DatasetQuery` reference implementation: an in-memory seeded
//! products/orders/traffic table set, parameterized by a scenario's
//! `seed` and `today`. §6 explicitly excludes the dataset schema from
//! the core; this binary owns it.
//!
//! The generator itself lives in `analyst_core::testing::FakeDataset`
//! (seed + day-count deterministic hashing), reused here rather than
//! re-implemented so the CLI's "real" dataset and the test suite's
//! fixtures can never drift apart. 120 days of history starting 90
//! days before `today`, matching the §8 scenario parameters (seed 42,
//! 120 days from 2025-10-01, today 2026-02-04 -> start is 120 days
//! before today).

use analyst_core::testing::FakeDataset;

const DAY_COUNT: i64 = 120;

/// Builds the dataset for one scenario run: `day_count` days of seeded
/// history ending on `today`.
pub fn for_scenario(seed: u64, today: &str) -> FakeDataset {
    let today = analyst_core::clock::parse_date(today).expect("scenario `today` already validated");
    let start = today - chrono::Duration::days(DAY_COUNT);
    FakeDataset::seeded(seed, DAY_COUNT + 1, &start.format("%Y-%m-%d").to_string())
}
