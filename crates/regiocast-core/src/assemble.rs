//! Grouping of per-region forecast chunks into the request result.

use crate::error::ForecastError;
use crate::mode::ForecastMode;
use crate::series::ForecastPoint;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// A recoverable failure recorded while producing a result.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub region: String,
    pub timestamp: Option<NaiveDateTime>,
    /// Stable kind tag, see [`ForecastError::kind`].
    pub kind: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        region: impl Into<String>,
        timestamp: Option<NaiveDateTime>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            timestamp,
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn from_error(
        region: impl Into<String>,
        timestamp: Option<NaiveDateTime>,
        error: &ForecastError,
    ) -> Self {
        Self::new(region, timestamp, error.kind(), error.to_string())
    }
}

/// Forecasts of one request, keyed by region.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub mode: ForecastMode,
    pub regions: BTreeMap<String, Vec<ForecastPoint>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ForecastResult {
    pub fn region(&self, name: &str) -> Option<&[ForecastPoint]> {
        self.regions.get(name).map(|v| v.as_slice())
    }

    /// Total number of forecast points over all regions.
    pub fn n_points(&self) -> usize {
        self.regions.values().map(|v| v.len()).sum()
    }
}

/// Group chunks by region, concatenating chunks of the same region in input
/// order and stable-sorting each region by timestamp.
pub fn assemble(
    chunks: Vec<(String, Vec<ForecastPoint>)>,
    mode: ForecastMode,
    diagnostics: Vec<Diagnostic>,
) -> ForecastResult {
    let mut regions: BTreeMap<String, Vec<ForecastPoint>> = BTreeMap::new();
    for (region, points) in chunks {
        regions.entry(region).or_default().extend(points);
    }
    for points in regions.values_mut() {
        points.sort_by_key(|p| p.timestamp);
    }

    ForecastResult {
        mode,
        regions,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn point(m: u32, v: f64) -> ForecastPoint {
        ForecastPoint {
            timestamp: NaiveDate::from_ymd_opt(2021, m, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            predicted: v,
            actual: None,
        }
    }

    #[test]
    fn test_groups_and_sorts() {
        let chunks = vec![
            ("Nakuru".to_string(), vec![point(3, 3.0), point(1, 1.0)]),
            ("Kisumu".to_string(), vec![point(2, 9.0)]),
            ("Nakuru".to_string(), vec![point(2, 2.0)]),
        ];
        let result = assemble(chunks, ForecastMode::Rolling, Vec::new());

        let keys: Vec<&String> = result.regions.keys().collect();
        assert_eq!(keys, vec!["Kisumu", "Nakuru"]);
        let values: Vec<f64> = result.region("Nakuru").unwrap().iter().map(|p| p.predicted).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(result.n_points(), 4);
        assert_eq!(result.mode, ForecastMode::Rolling);
    }

    #[test]
    fn test_stable_on_equal_timestamps() {
        let chunks = vec![
            ("A".to_string(), vec![point(1, 1.0)]),
            ("A".to_string(), vec![point(1, 2.0)]),
        ];
        let result = assemble(chunks, ForecastMode::Longterm, Vec::new());
        let values: Vec<f64> = result.region("A").unwrap().iter().map(|p| p.predicted).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_empty_region_is_kept() {
        let result = assemble(
            vec![("B".to_string(), Vec::new())],
            ForecastMode::Longterm,
            vec![Diagnostic::from_error(
                "B",
                None,
                &ForecastError::ModelFit("x".into()),
            )],
        );
        assert_eq!(result.region("B"), Some(&[][..]));
        assert_eq!(result.diagnostics[0].kind, "model_fit");
    }
}
