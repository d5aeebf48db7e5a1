//! On-demand aggregation over the raw analytics window.
//!
//! Nothing is pre-computed: the Query API asks for `days` of history and
//! the summary is derived from the stored records each time. Growth
//! compares the current window against the equally sized preceding one;
//! a preceding window with zero requests reports growth 0 rather than a
//! division blowup.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::DateTime;
use serde::Serialize;

use loft_core::AnalyticsRecord;
use loft_state::{StateResult, StateStore};

/// Path fragments that indicate automated probing.
pub const SUSPICIOUS_PATTERNS: &[&str] = &[
    "/admin",
    "/.env",
    "/wp-login",
    "/.git",
    "/phpmyadmin",
    "/config",
];

/// How many entries top-N listings keep.
const TOP_N: usize = 5;

const DAY_MS: u64 = 86_400_000;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CountedEntry {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayCount {
    /// `YYYY-MM-DD` bucket.
    pub day: String,
    pub count: u64,
}

/// The aggregate served to the dashboard.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalyticsSummary {
    pub total_requests: u64,
    /// Distinct client IPs in the window.
    pub unique_visitors: u64,
    pub avg_response_time_ms: f64,
    pub requests_per_day: Vec<DayCount>,
    pub top_countries: Vec<CountedEntry>,
    pub top_paths: Vec<CountedEntry>,
    /// Status ≥ 400, grouped by path.
    pub top_error_pages: Vec<CountedEntry>,
    /// Requests matching the probing patterns, grouped by path.
    pub suspicious_requests: Vec<CountedEntry>,
    /// Percent change vs the preceding window of equal size.
    pub growth_pct: f64,
}

/// Load the window from the store and aggregate it.
pub fn summarize(
    store: &StateStore,
    subdomain: &str,
    days: u32,
    now_ms: u64,
) -> StateResult<AnalyticsSummary> {
    let window_ms = u64::from(days.max(1)) * DAY_MS;
    let current_from = now_ms.saturating_sub(window_ms);
    let previous_from = now_ms.saturating_sub(window_ms * 2);

    let records = store.analytics_since(subdomain, previous_from)?;
    let (current, previous): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| r.timestamp >= current_from);

    Ok(aggregate(&current, previous.len() as u64))
}

/// Aggregate a window of records given the preceding window's count.
pub fn aggregate(records: &[AnalyticsRecord], previous_count: u64) -> AnalyticsSummary {
    let total_requests = records.len() as u64;

    let unique_visitors = records
        .iter()
        .map(|r| r.client_ip.as_str())
        .collect::<HashSet<_>>()
        .len() as u64;

    let avg_response_time_ms = if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| r.response_time_ms as f64).sum::<f64>() / records.len() as f64
    };

    let mut per_day: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        let day = DateTime::from_timestamp_millis(record.timestamp as i64)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        *per_day.entry(day).or_default() += 1;
    }
    let requests_per_day = per_day
        .into_iter()
        .map(|(day, count)| DayCount { day, count })
        .collect();

    let top_countries = top_by(records.iter().map(|r| r.country.as_str()));
    let top_paths = top_by(records.iter().map(|r| r.path.as_str()));
    let top_error_pages = top_by(
        records
            .iter()
            .filter(|r| r.status_code >= 400)
            .map(|r| r.path.as_str()),
    );
    let suspicious_requests = top_by(
        records
            .iter()
            .filter(|r| {
                SUSPICIOUS_PATTERNS
                    .iter()
                    .any(|pattern| r.path.contains(pattern))
            })
            .map(|r| r.path.as_str()),
    );

    let growth_pct = if previous_count == 0 {
        0.0
    } else {
        (total_requests as f64 - previous_count as f64) / previous_count as f64 * 100.0
    };

    AnalyticsSummary {
        total_requests,
        unique_visitors,
        avg_response_time_ms,
        requests_per_day,
        top_countries,
        top_paths,
        top_error_pages,
        suspicious_requests,
        growth_pct,
    }
}

/// Count keys and keep the TOP_N, highest count first; ties break on key
/// so the output is deterministic.
fn top_by<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<CountedEntry> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    let mut entries: Vec<CountedEntry> = counts
        .into_iter()
        .map(|(key, count)| CountedEntry {
            key: key.to_string(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.key.cmp(&b.key)));
    entries.truncate(TOP_N);
    entries
}
