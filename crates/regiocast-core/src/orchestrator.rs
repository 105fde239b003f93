//! Per-region orchestration: column resolution, partitioning by region and
//! dispatch to the selected strategy.

use crate::assemble::{assemble, Diagnostic, ForecastResult};
use crate::control::{RunControl, RunTracker};
use crate::error::{ForecastError, Result};
use crate::frame::{CleanedFrame, Column, ColumnData, ColumnType};
use crate::grid::StepGranularity;
use crate::longterm::run_longterm;
use crate::mode::ForecastMode;
use crate::model::{Backend, ModelFactory, ModelSpec};
use crate::rolling::{run_rolling, DEFAULT_MIN_HISTORY};
use crate::series::{parse_timestamp, sort_and_dedupe, DuplicatePolicy, ForecastPoint, TimeSeriesPoint};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Options for one forecast request.
#[derive(Debug, Clone)]
pub struct ForecastOptions {
    /// Numeric column to forecast.
    pub target_column: String,
    /// Column whose values partition the rows into regions.
    pub region_column: String,
    /// Timestamp column; detected when `None`.
    pub date_column: Option<String>,
    pub mode: ForecastMode,
    pub backend: Backend,
    /// Steps projected past the data in longterm mode.
    pub periods: usize,
    /// Minimum training points for a rolling step.
    pub min_history: usize,
    /// Grid spacing; detected per region from its timestamps when `None`.
    pub granularity: Option<StepGranularity>,
    pub duplicates: DuplicatePolicy,
    /// Limits for each request run with these options.
    pub control: RunControl,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            target_column: String::new(),
            region_column: "county".to_string(),
            date_column: None,
            mode: ForecastMode::Longterm,
            backend: Backend::Statistical,
            periods: 30,
            min_history: DEFAULT_MIN_HISTORY,
            granularity: None,
            duplicates: DuplicatePolicy::KeepFirst,
            control: RunControl::default(),
        }
    }
}

impl ForecastOptions {
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.mode == ForecastMode::Longterm && self.periods == 0 {
            return Err(ForecastError::InvalidParameter {
                param: "periods".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.mode == ForecastMode::Rolling && self.min_history == 0 {
            return Err(ForecastError::InvalidParameter {
                param: "min_history".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Run the request with the model factory implied by the options.
pub fn run(frame: &CleanedFrame, options: &ForecastOptions) -> Result<ForecastResult> {
    let factory = ModelSpec {
        backend: options.backend,
        granularity: options.granularity,
    };
    run_with_factory(frame, options, &factory)
}

/// Run the request, creating every model from `factory`.
pub fn run_with_factory(
    frame: &CleanedFrame,
    options: &ForecastOptions,
    factory: &dyn ModelFactory,
) -> Result<ForecastResult> {
    options.validate()?;

    let target = frame.find_column(&options.target_column)?;
    let region = frame.find_column(&options.region_column)?;
    let (date_name, timestamps) = resolve_dates(frame, options.date_column.as_deref())?;

    let values = match &target.data {
        ColumnData::Numeric(v) => v,
        other => {
            return Err(ForecastError::InvalidInput(format!(
                "Target column '{}' is {}, expected numeric",
                target.name,
                other.column_type().name()
            )))
        }
    };
    tracing::debug!(
        target = %target.name,
        region = %region.name,
        date = %date_name,
        rows = frame.n_rows(),
        "resolved forecast columns"
    );

    let (series, mut diagnostics) =
        partition(region, &timestamps, values, options.duplicates)?;

    let tracker = options.control.start();
    let outcomes = series
        .into_par_iter()
        .map(|(name, points)| forecast_region(name, points, options, factory, &tracker))
        .collect::<Result<Vec<_>>>()?;

    let mut chunks = Vec::with_capacity(outcomes.len());
    for (name, points, region_diagnostics) in outcomes {
        chunks.push((name, points));
        diagnostics.extend(region_diagnostics);
    }

    let result = assemble(chunks, options.mode, diagnostics);
    tracing::info!(
        mode = %result.mode,
        regions = result.regions.len(),
        points = result.n_points(),
        diagnostics = result.diagnostics.len(),
        fits = tracker.fits_started(),
        "forecast complete"
    );
    Ok(result)
}

/// Pick the timestamp column and return its name and per-row timestamps.
fn resolve_dates(
    frame: &CleanedFrame,
    explicit: Option<&str>,
) -> Result<(String, Vec<Option<NaiveDateTime>>)> {
    if let Some(name) = explicit {
        let column = frame.find_column(name)?;
        return column_timestamps(column)
            .map(|ts| (column.name.clone(), ts))
            .ok_or_else(|| {
                ForecastError::InvalidInput(format!(
                    "Date column '{}' does not hold dates",
                    column.name
                ))
            });
    }

    let detected = frame
        .columns()
        .iter()
        .find(|c| c.column_type() == ColumnType::Timestamp)
        .or_else(|| {
            frame
                .columns()
                .iter()
                .filter(|c| c.column_type() == ColumnType::Text)
                .find(|c| column_timestamps(c).is_some())
        });

    detected
        .and_then(|c| column_timestamps(c).map(|ts| (c.name.clone(), ts)))
        .ok_or_else(|| ForecastError::missing_column("date", &frame.column_names()))
}

/// Timestamps of a column, or `None` when it cannot serve as a date column.
///
/// Text columns qualify when every non-empty cell parses as a date and at
/// least one cell is non-empty.
pub(crate) fn column_timestamps(column: &Column) -> Option<Vec<Option<NaiveDateTime>>> {
    match &column.data {
        ColumnData::Timestamp(v) => Some(v.clone()),
        ColumnData::Text(v) => {
            let mut any = false;
            let mut out = Vec::with_capacity(v.len());
            for text in v {
                if text.trim().is_empty() {
                    out.push(None);
                    continue;
                }
                out.push(Some(parse_timestamp(text)?));
                any = true;
            }
            any.then_some(out)
        }
        ColumnData::Numeric(_) => None,
    }
}

type RegionSeries = Vec<(String, Vec<TimeSeriesPoint>)>;

/// Split rows into per-region series, dropping rows without a timestamp.
fn partition(
    region: &Column,
    timestamps: &[Option<NaiveDateTime>],
    values: &[f64],
    duplicates: DuplicatePolicy,
) -> Result<(RegionSeries, Vec<Diagnostic>)> {
    let mut groups: BTreeMap<String, Vec<TimeSeriesPoint>> = BTreeMap::new();
    let mut dropped: BTreeMap<String, usize> = BTreeMap::new();

    for (row, (ts, value)) in timestamps.iter().zip(values).enumerate() {
        let key = region.data.display(row);
        match ts {
            Some(ts) => groups
                .entry(key)
                .or_default()
                .push(TimeSeriesPoint::new(*ts, *value)),
            None => *dropped.entry(key).or_default() += 1,
        }
    }

    let diagnostics = dropped
        .into_iter()
        .map(|(key, count)| {
            tracing::warn!(region = %key, count, "dropping rows without a valid timestamp");
            Diagnostic::new(
                key,
                None,
                "dropped_rows",
                format!("{} rows without a valid timestamp were dropped", count),
            )
        })
        .collect();

    let series = groups
        .into_iter()
        .map(|(key, points)| {
            let points = sort_and_dedupe(points, duplicates).map_err(|e| match e {
                ForecastError::InvalidInput(msg) => {
                    ForecastError::InvalidInput(format!("region '{}': {}", key, msg))
                }
                other => other,
            })?;
            Ok((key, points))
        })
        .collect::<Result<RegionSeries>>()?;

    Ok((series, diagnostics))
}

fn forecast_region(
    name: String,
    points: Vec<TimeSeriesPoint>,
    options: &ForecastOptions,
    factory: &dyn ModelFactory,
    tracker: &RunTracker,
) -> Result<(String, Vec<ForecastPoint>, Vec<Diagnostic>)> {
    match options.mode {
        ForecastMode::Longterm => {
            let stamps: Vec<NaiveDateTime> = points.iter().map(|p| p.timestamp).collect();
            let granularity = StepGranularity::resolve(options.granularity, &stamps);
            tracing::debug!(region = %name, ?granularity, "projecting region");
            match run_longterm(&points, options.periods, factory, granularity, tracker) {
                Ok(forecast) => Ok((name, forecast, Vec::new())),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(region = %name, error = %e, "region fit failed");
                    let diagnostic = Diagnostic::from_error(&name, None, &e);
                    Ok((name, Vec::new(), vec![diagnostic]))
                }
                Err(e) => Err(e),
            }
        }
        ForecastMode::Rolling => {
            let outcome = run_rolling(&points, options.min_history, factory, tracker)?;
            let diagnostics = outcome
                .failures
                .iter()
                .map(|f| Diagnostic::from_error(&name, Some(f.target), &f.error))
                .collect();
            Ok((name, outcome.points, diagnostics))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn month(i: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020 + (i / 12) as i32, i % 12 + 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn frame(regions: &[(&str, u32)]) -> CleanedFrame {
        let mut county = Vec::new();
        let mut dates = Vec::new();
        let mut cases = Vec::new();
        for (name, n) in regions {
            for i in 0..*n {
                county.push(name.to_string());
                dates.push(Some(month(i)));
                cases.push(10.0 + i as f64 + name.len() as f64);
            }
        }
        CleanedFrame::new(vec![
            Column::new("Date", ColumnData::Timestamp(dates)),
            Column::new("County", ColumnData::Text(county)),
            Column::new("Number of Cases", ColumnData::Numeric(cases)),
        ])
        .unwrap()
    }

    #[test]
    fn test_columns_found_by_key() {
        let mut options = ForecastOptions::new("number_of_cases");
        options.periods = 2;
        let result = run(&frame(&[("Nakuru", 12)]), &options).unwrap();
        assert_eq!(result.region("Nakuru").unwrap().len(), 14);
    }

    #[test]
    fn test_missing_target() {
        let err = run(&frame(&[("Nakuru", 12)]), &ForecastOptions::new("deaths")).unwrap_err();
        assert!(matches!(err, ForecastError::MissingColumn { ref column, .. } if column == "deaths"));
    }

    #[test]
    fn test_text_target_rejected() {
        let err = run(&frame(&[("Nakuru", 12)]), &ForecastOptions::new("County")).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidInput(_)));
    }

    #[test]
    fn test_text_date_column_detected() {
        let dates: Vec<String> = (0..8).map(|i| month(i).format("%Y-%m-%d").to_string()).collect();
        let frame = CleanedFrame::new(vec![
            Column::new("county", ColumnData::Text(vec!["Kisumu".to_string(); 8])),
            Column::new("month", ColumnData::Text(dates)),
            Column::new("cases", ColumnData::Numeric((0..8).map(|i| i as f64).collect())),
        ])
        .unwrap();

        let mut options = ForecastOptions::new("cases");
        options.mode = ForecastMode::Rolling;
        let result = run(&frame, &options).unwrap();
        assert_eq!(result.region("Kisumu").unwrap().len(), 2);
    }

    #[test]
    fn test_no_date_column() {
        let frame = CleanedFrame::new(vec![
            Column::new("county", ColumnData::Text(vec!["A".to_string()])),
            Column::new("cases", ColumnData::Numeric(vec![1.0])),
        ])
        .unwrap();
        let err = run(&frame, &ForecastOptions::new("cases")).unwrap_err();
        assert!(matches!(err, ForecastError::MissingColumn { ref column, .. } if column == "date"));
    }

    #[test]
    fn test_rows_without_timestamp_dropped() {
        let frame = CleanedFrame::new(vec![
            Column::new(
                "date",
                ColumnData::Timestamp(vec![Some(month(0)), None, Some(month(1)), Some(month(2))]),
            ),
            Column::new("county", ColumnData::Text(vec!["A".to_string(); 4])),
            Column::new("cases", ColumnData::Numeric(vec![1.0, 2.0, 3.0, 4.0])),
        ])
        .unwrap();
        let mut options = ForecastOptions::new("cases");
        options.periods = 1;
        let result = run(&frame, &options).unwrap();
        assert_eq!(result.region("A").unwrap().len(), 4);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, "dropped_rows");
    }

    #[test]
    fn test_short_region_becomes_diagnostic() {
        let mut options = ForecastOptions::new("Number of Cases");
        options.periods = 3;
        let result = run(&frame(&[("Nakuru", 12), ("Lamu", 1)]), &options).unwrap();
        assert_eq!(result.region("Nakuru").unwrap().len(), 15);
        assert_eq!(result.region("Lamu"), Some(&[][..]));
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].region, "Lamu");
    }

    #[test]
    fn test_duplicate_error_policy() {
        let frame = CleanedFrame::new(vec![
            Column::new("date", ColumnData::Timestamp(vec![Some(month(0)), Some(month(0))])),
            Column::new("county", ColumnData::Text(vec!["A".to_string(); 2])),
            Column::new("cases", ColumnData::Numeric(vec![1.0, 2.0])),
        ])
        .unwrap();
        let mut options = ForecastOptions::new("cases");
        options.duplicates = DuplicatePolicy::Error;
        assert!(matches!(
            run(&frame, &options),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_daily_rolling_predicts_every_step() {
        let start = month(0);
        let n = 40;
        let frame = CleanedFrame::new(vec![
            Column::new(
                "date",
                ColumnData::Timestamp((0..n).map(|d| Some(start + chrono::Duration::days(d))).collect()),
            ),
            Column::new("county", ColumnData::Text(vec!["Lamu".to_string(); n as usize])),
            Column::new(
                "cases",
                ColumnData::Numeric((0..n).map(|d| 30.0 + 0.5 * d as f64 + (d % 7) as f64).collect()),
            ),
        ])
        .unwrap();

        let mut options = ForecastOptions::new("cases");
        options.mode = ForecastMode::Rolling;
        let result = run(&frame, &options).unwrap();
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let points = result.region("Lamu").unwrap();
        assert_eq!(points.len(), n as usize - DEFAULT_MIN_HISTORY);
        assert_eq!(points[0].timestamp, start + chrono::Duration::days(6));

        options.mode = ForecastMode::Longterm;
        options.periods = 3;
        let result = run(&frame, &options).unwrap();
        let points = result.region("Lamu").unwrap();
        assert_eq!(points.len(), n as usize + 3);
        assert_eq!(points[n as usize].timestamp, start + chrono::Duration::days(n));
    }

    #[test]
    fn test_reused_options_start_a_fresh_budget() {
        let mut options = ForecastOptions::new("Number of Cases");
        options.mode = ForecastMode::Rolling;
        options.control = RunControl::new().with_max_fits(4);
        let frame = frame(&[("Kisumu", 10)]);

        let first = run(&frame, &options).unwrap();
        let second = run(&frame, &options.clone()).unwrap();
        assert_eq!(first.region("Kisumu").unwrap().len(), 4);
        assert_eq!(first, second);

        options.control = RunControl::new().with_max_fits(3);
        assert_eq!(run(&frame, &options), Err(ForecastError::BudgetExhausted(3)));
    }

    #[test]
    fn test_default_request_is_bounded() {
        let options = ForecastOptions::default();
        assert!(options.control.deadline.is_some() || options.control.max_fits.is_some());
    }

    #[test]
    fn test_zero_periods_rejected_up_front() {
        let mut options = ForecastOptions::new("Number of Cases");
        options.periods = 0;
        assert!(matches!(
            run(&frame(&[("Nakuru", 12)]), &options),
            Err(ForecastError::InvalidParameter { .. })
        ));
    }
}
