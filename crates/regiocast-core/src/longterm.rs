//! Longterm strategy: one fit per region, projected past the data.

use crate::control::RunTracker;
use crate::error::{ForecastError, Result};
use crate::grid::StepGranularity;
use crate::model::{fit_predict_with, ModelFactory};
use crate::series::{actual_at, ForecastPoint, TimeSeriesPoint};
use chrono::NaiveDateTime;

/// Fit once on the full `series` and predict every observed timestamp plus
/// `periods` grid steps after the last one.
///
/// `series` must be sorted by timestamp with unique timestamps. Observed
/// timestamps carry their actual value; the extension does not.
pub fn run_longterm(
    series: &[TimeSeriesPoint],
    periods: usize,
    factory: &dyn ModelFactory,
    granularity: StepGranularity,
    control: &RunTracker,
) -> Result<Vec<ForecastPoint>> {
    if periods == 0 {
        return Err(ForecastError::InvalidParameter {
            param: "periods".to_string(),
            value: periods.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let last = series
        .last()
        .map(|p| p.timestamp)
        .ok_or(ForecastError::InsufficientData { needed: 1, got: 0 })?;

    let future = granularity.steps_after(last, periods);
    if future.len() != periods {
        return Err(ForecastError::InvalidParameter {
            param: "periods".to_string(),
            value: periods.to_string(),
            reason: "extends past the supported date range".to_string(),
        });
    }

    let timestamps: Vec<NaiveDateTime> = series
        .iter()
        .map(|p| p.timestamp)
        .chain(future)
        .collect();

    control.check_fit()?;
    let predicted = fit_predict_with(factory, series, &timestamps)?;

    Ok(predicted
        .into_iter()
        .map(|(timestamp, value)| ForecastPoint {
            timestamp,
            predicted: value,
            actual: actual_at(series, timestamp),
        })
        .collect())
}
