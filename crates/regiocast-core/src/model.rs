//! Uniform fit/predict contract over the pluggable forecasting backends.
//!
//! Every fit goes through a [`ModelFactory`], which hands out a brand-new
//! model instance. Nothing is cached between calls, so one region or one
//! backtest step can never see another's fitted state.

use crate::arnet::ArNet;
use crate::error::{ForecastError, Result};
use crate::grid::{StepGranularity, StepGrid};
use crate::series::TimeSeriesPoint;
use crate::smoothing::Smoothing;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Forecasting algorithm behind the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Exponential smoothing (ETS with a Holt fallback).
    #[default]
    Statistical,
    /// Autoregressive network with a linear skip path.
    Neural,
}

impl std::str::FromStr for Backend {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "statistical" | "prophet" | "ets" | "stat" => Ok(Backend::Statistical),
            "neural" | "neuralprophet" | "arnet" | "ar-net" | "ar_net" => Ok(Backend::Neural),
            other => Err(ForecastError::InvalidParameter {
                param: "backend".to_string(),
                value: other.to_string(),
                reason: "expected statistical or neural".to_string(),
            }),
        }
    }
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Statistical => "statistical",
            Backend::Neural => "neural",
        }
    }
}

/// A single-use forecasting model.
pub trait SeriesModel {
    /// Fit on a history sorted by timestamp.
    fn fit(&mut self, history: &[TimeSeriesPoint]) -> Result<()>;

    /// Predict one value per requested timestamp, in request order.
    fn predict(&self, timestamps: &[NaiveDateTime]) -> Result<Vec<f64>>;

    fn name(&self) -> &str;
}

/// Stateless source of fresh model instances.
pub trait ModelFactory: Send + Sync {
    fn create(&self) -> Box<dyn SeriesModel>;
}

impl<F> ModelFactory for F
where
    F: Fn() -> Box<dyn SeriesModel> + Send + Sync,
{
    fn create(&self) -> Box<dyn SeriesModel> {
        self()
    }
}

/// Default factory: a backend on a step grid.
///
/// With `granularity` unset every model detects the grid spacing from the
/// history it is fitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelSpec {
    pub backend: Backend,
    pub granularity: Option<StepGranularity>,
}

impl ModelSpec {
    /// A backend on a fixed grid.
    pub fn new(backend: Backend, granularity: StepGranularity) -> Self {
        Self {
            backend,
            granularity: Some(granularity),
        }
    }

    /// A backend whose grid spacing is detected per fit.
    pub fn detecting(backend: Backend) -> Self {
        Self {
            backend,
            granularity: None,
        }
    }
}

impl ModelFactory for ModelSpec {
    fn create(&self) -> Box<dyn SeriesModel> {
        match self.backend {
            Backend::Statistical => Box::new(GridModel::new(Smoothing::default(), self.granularity)),
            Backend::Neural => Box::new(GridModel::new(ArNet::default(), self.granularity)),
        }
    }
}

/// A forecaster that works on evenly spaced values.
pub trait GridForecaster {
    /// Fit on the grid values.
    fn fit_values(&mut self, values: &[f64], steps_per_year: usize) -> Result<()>;

    /// In-sample one-step-ahead values, same length as the fitted grid.
    fn fitted(&self) -> &[f64];

    /// Values for the `horizon` steps after the grid.
    fn forecast(&self, horizon: usize) -> Result<Vec<f64>>;

    fn name(&self) -> &str;
}

/// Adapts a [`GridForecaster`] to timestamped history and queries.
pub struct GridModel<F> {
    inner: F,
    /// Fixed spacing; detected from the history when `None`.
    granularity: Option<StepGranularity>,
    grid: Option<StepGrid>,
}

impl<F: GridForecaster> GridModel<F> {
    pub fn new(inner: F, granularity: Option<StepGranularity>) -> Self {
        Self {
            inner,
            granularity,
            grid: None,
        }
    }
}

impl<F: GridForecaster> SeriesModel for GridModel<F> {
    fn fit(&mut self, history: &[TimeSeriesPoint]) -> Result<()> {
        let timestamps: Vec<NaiveDateTime> = history.iter().map(|p| p.timestamp).collect();
        let granularity = StepGranularity::resolve(self.granularity, &timestamps);
        let grid = StepGrid::from_points(history, granularity)?;
        self.inner
            .fit_values(&grid.values, granularity.steps_per_year())?;
        self.grid = Some(grid);
        Ok(())
    }

    fn predict(&self, timestamps: &[NaiveDateTime]) -> Result<Vec<f64>> {
        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| ForecastError::ModelFit("predict called before fit".to_string()))?;
        let fitted = self.inner.fitted();
        let n = grid.len() as i64;

        let indices: Vec<i64> = timestamps.iter().map(|t| grid.index_of(*t)).collect();
        let horizon = indices.iter().map(|&k| k - n + 1).max().unwrap_or(0).max(0) as usize;
        let ahead = if horizon > 0 {
            self.inner.forecast(horizon)?
        } else {
            Vec::new()
        };

        indices
            .iter()
            .map(|&k| {
                let value = if k < 0 {
                    fitted.first().copied()
                } else if k < n {
                    fitted.get(k as usize).copied()
                } else {
                    ahead.get((k - n) as usize).copied()
                };
                value.ok_or_else(|| {
                    ForecastError::ModelFit(format!(
                        "{} produced no value for grid step {}",
                        self.inner.name(),
                        k
                    ))
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Fit a fresh model from `factory` and predict the requested timestamps.
pub fn fit_predict_with(
    factory: &dyn ModelFactory,
    history: &[TimeSeriesPoint],
    future: &[NaiveDateTime],
) -> Result<BTreeMap<NaiveDateTime, f64>> {
    let mut model = factory.create();
    model.fit(history)?;
    let predicted = model.predict(future)?;

    if let Some(bad) = predicted.iter().position(|v| !v.is_finite()) {
        return Err(ForecastError::ModelFit(format!(
            "{} produced a non-finite value at {}",
            model.name(),
            future[bad]
        )));
    }

    Ok(future.iter().copied().zip(predicted).collect())
}

/// Fit a fresh `backend` model on the detected step grid and predict
/// `future`.
pub fn fit_predict(
    history: &[TimeSeriesPoint],
    future: &[NaiveDateTime],
    backend: Backend,
) -> Result<BTreeMap<NaiveDateTime, f64>> {
    fit_predict_with(
        &ModelSpec::detecting(backend),
        history,
        future,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn month(i: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020 + (i / 12) as i32, i % 12 + 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn history(n: u32) -> Vec<TimeSeriesPoint> {
        (0..n)
            .map(|i| TimeSeriesPoint::new(month(i), 10.0 + 2.0 * i as f64))
            .collect()
    }

    struct LastValue {
        last: Option<f64>,
    }

    impl SeriesModel for LastValue {
        fn fit(&mut self, history: &[TimeSeriesPoint]) -> Result<()> {
            assert!(self.last.is_none(), "model instance reused");
            self.last = history.last().map(|p| p.value);
            Ok(())
        }

        fn predict(&self, timestamps: &[NaiveDateTime]) -> Result<Vec<f64>> {
            Ok(vec![self.last.unwrap_or(f64::NAN); timestamps.len()])
        }

        fn name(&self) -> &str {
            "LastValue"
        }
    }

    #[test]
    fn test_backend_aliases() {
        assert_eq!("prophet".parse::<Backend>().unwrap(), Backend::Statistical);
        assert_eq!("NeuralProphet".parse::<Backend>().unwrap(), Backend::Neural);
        assert!("lstm".parse::<Backend>().is_err());
    }

    #[test]
    fn test_factory_creates_fresh_instances() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let factory = move || -> Box<dyn SeriesModel> {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(LastValue { last: None })
        };

        let h = history(8);
        for _ in 0..3 {
            let out = fit_predict_with(&factory, &h, &[month(8)]).unwrap();
            assert_eq!(out[&month(8)], 24.0);
        }
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_non_finite_prediction_is_fit_error() {
        let factory = || -> Box<dyn SeriesModel> { Box::new(LastValue { last: None }) };
        let err = fit_predict_with(&factory, &[], &[month(0)]).unwrap_err();
        assert!(matches!(err, ForecastError::ModelFit(_)));
    }

    #[test]
    fn test_fit_predict_in_and_out_of_sample() {
        for backend in [Backend::Statistical, Backend::Neural] {
            let h = history(18);
            let future: Vec<NaiveDateTime> = (0..21).map(month).collect();
            let out = fit_predict(&h, &future, backend).unwrap();
            assert_eq!(out.len(), 21);
            assert!(out.values().all(|v| v.is_finite()), "{:?}", backend);
        }
    }

    #[test]
    fn test_daily_history_uses_daily_grid() {
        let start = month(0);
        let h: Vec<TimeSeriesPoint> = (0..8)
            .map(|d| TimeSeriesPoint::new(start + chrono::Duration::days(d), 5.0 + d as f64))
            .collect();
        let next = start + chrono::Duration::days(8);

        for backend in [Backend::Statistical, Backend::Neural] {
            let out = fit_predict(&h, &[h[3].timestamp, next], backend).unwrap();
            assert_eq!(out.len(), 2);
            assert!(out[&next] > h[0].value, "{:?}", backend);
        }
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = ModelSpec::default().create();
        assert!(model.predict(&[month(0)]).is_err());
    }
}
