//! Wall-clock abstraction and the this/last week-and-month boundaries
//! every planner and evaluator call derives "today" from.
//!
//! All date math here is UTC and weeks are Monday–Sunday; nothing in
//! this module consults the host locale.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Precomputed this/last week and this/last month boundaries for a given "today".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeContext {
    pub today: String,
    pub this_week_start: String,
    pub this_week_end: String,
    pub last_week_start: String,
    pub last_week_end: String,
    pub this_month_start: String,
    pub this_month_end: String,
    pub last_month_start: String,
    pub last_month_end: String,
}

fn fmt(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn month_end(year: i32, month: u32) -> NaiveDate {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1).unwrap() - Duration::days(1)
}

/// Compute the week/month boundaries for a given "today" date (UTC, ISO `YYYY-MM-DD`).
pub fn time_context_for(today: NaiveDate) -> TimeContext {
    let days_since_monday = today.weekday().num_days_from_monday() as i64;
    let this_week_start = today - Duration::days(days_since_monday);
    let this_week_end = this_week_start + Duration::days(6);
    let last_week_start = this_week_start - Duration::days(7);
    let last_week_end = this_week_start - Duration::days(1);

    let this_month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap();
    let this_month_end = month_end(today.year(), today.month());
    let (ly, lm) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    let last_month_start = NaiveDate::from_ymd_opt(ly, lm, 1).unwrap();
    let last_month_end = month_end(ly, lm);

    TimeContext {
        today: fmt(today),
        this_week_start: fmt(this_week_start),
        this_week_end: fmt(this_week_end),
        last_week_start: fmt(last_week_start),
        last_week_end: fmt(last_week_end),
        this_month_start: fmt(this_month_start),
        this_month_end: fmt(this_month_end),
        last_month_start: fmt(last_month_start),
        last_month_end: fmt(last_month_end),
    }
}

/// Parses an ISO `YYYY-MM-DD` (or a longer timestamp, truncated to its date
/// prefix) into a [`NaiveDate`]; panics only on genuinely malformed input
/// which callers are expected to have already validated against the ISO
/// date regex.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let prefix = &s[..s.len().min(10)];
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Formats a millisecond epoch timestamp (as returned by
/// `Clock::now_ms`) as RFC3339 UTC, the timestamp shape used
/// throughout the persisted schema (`created_at`, `lastUsedAt`, …).
pub fn iso_from_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(|| Utc::now()).to_rfc3339()
}

/// Resolves "today" and the week/month boundaries derived from it.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now_ms(&self) -> i64;

    fn time_context(&self) -> TimeContext {
        time_context_for(self.today())
    }
}

/// The real clock: wraps `chrono::Utc::now()`.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock pinned to a fixed date, used for `today` overrides and tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    today: NaiveDate,
    now_ms: i64,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        let now_ms = today.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis();
        Self { today, now_ms }
    }

    pub fn from_iso(today: &str) -> Option<Self> {
        parse_date(today).map(Self::new)
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }

    fn now_ms(&self) -> i64 {
        self.now_ms
    }
}
