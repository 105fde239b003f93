//! Per-region series points and forecast output points.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// One observation of the target column for one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One predicted value, with the observed value when there is one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: NaiveDateTime,
    pub predicted: f64,
    pub actual: Option<f64>,
}

/// How repeated timestamps inside one region are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep the first row in input order.
    #[default]
    KeepFirst,
    /// Average all rows sharing the timestamp.
    Mean,
    /// Reject the request.
    Error,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" | "keep_first" | "keepfirst" => Ok(DuplicatePolicy::KeepFirst),
            "mean" | "average" => Ok(DuplicatePolicy::Mean),
            "error" | "reject" => Ok(DuplicatePolicy::Error),
            other => Err(ForecastError::InvalidParameter {
                param: "duplicates".to_string(),
                value: other.to_string(),
                reason: "expected first, mean or error".to_string(),
            }),
        }
    }
}

/// Sort points by timestamp and collapse duplicates according to `policy`.
///
/// The sort is stable, so "first" means first in input order.
pub fn sort_and_dedupe(
    mut points: Vec<TimeSeriesPoint>,
    policy: DuplicatePolicy,
) -> Result<Vec<TimeSeriesPoint>> {
    points.sort_by_key(|p| p.timestamp);

    let mut out: Vec<TimeSeriesPoint> = Vec::with_capacity(points.len());
    let mut run_len = 0usize;
    for p in points {
        match out.last_mut() {
            Some(last) if last.timestamp == p.timestamp => match policy {
                DuplicatePolicy::KeepFirst => {}
                DuplicatePolicy::Mean => {
                    run_len += 1;
                    last.value += (p.value - last.value) / run_len as f64;
                }
                DuplicatePolicy::Error => {
                    return Err(ForecastError::InvalidInput(format!(
                        "duplicate timestamp {}",
                        p.timestamp
                    )))
                }
            },
            _ => {
                out.push(p);
                run_len = 1;
            }
        }
    }
    Ok(out)
}

/// Value observed at exactly `timestamp`, if any. `points` must be sorted.
pub fn actual_at(points: &[TimeSeriesPoint], timestamp: NaiveDateTime) -> Option<f64> {
    points
        .binary_search_by_key(&timestamp, |p| p.timestamp)
        .ok()
        .map(|i| points[i].value)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Parse a textual date the way uploaded sheets usually spell them.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    // Year-month only, e.g. "2021-03"
    NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
