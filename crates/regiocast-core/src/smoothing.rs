//! Statistical backend: exponential smoothing on the step grid.
//!
//! Uses the `anofox-forecast` ETS model. When the ETS fit fails (too short,
//! degenerate variance, ...) a Holt linear smoother takes over.

use crate::error::{ForecastError, Result};
use crate::model::GridForecaster;
use anofox_forecast::models::exponential::{ETSSpec, ETS as ETSModel};
use anofox_forecast::prelude::Forecaster;

/// Which smoother produced the current fit.
enum Fitted {
    Ets(Box<ETSModel>),
    Holt,
}

/// Exponential smoothing forecaster.
pub struct Smoothing {
    /// Level smoothing for the Holt fallback.
    pub alpha: f64,
    /// Trend smoothing for the Holt fallback.
    pub beta: f64,
    values: Vec<f64>,
    fitted: Vec<f64>,
    method: Option<Fitted>,
    name: String,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.1,
            values: Vec::new(),
            fitted: Vec::new(),
            method: None,
            name: "Smoothing".to_string(),
        }
    }
}

/// ETS notation and seasonal period for a series of `n` steps.
///
/// A seasonal model needs two full cycles.
fn choose_ets(n: usize, steps_per_year: usize) -> (&'static str, usize) {
    if steps_per_year > 1 && n >= 2 * steps_per_year {
        ("AAA", steps_per_year)
    } else {
        ("AAN", 1)
    }
}

impl GridForecaster for Smoothing {
    fn fit_values(&mut self, values: &[f64], steps_per_year: usize) -> Result<()> {
        if values.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: values.len(),
            });
        }

        let (notation, period) = choose_ets(values.len(), steps_per_year);
        let spec = ETSSpec::from_notation(notation).map_err(|e| {
            ForecastError::ModelFit(format!("Invalid ETS specification '{}': {}", notation, e))
        })?;

        match fit_ets(values, period, &spec) {
            Ok((model, fitted)) => {
                self.fitted = fitted;
                self.method = Some(Fitted::Ets(Box::new(model)));
                self.name = format!("ETS({})", spec.short_name());
            }
            Err(e) => {
                tracing::debug!(error = %e, n = values.len(), "ETS fit failed, using Holt");
                self.fitted = holt_fitted(values, self.alpha, self.beta);
                self.method = Some(Fitted::Holt);
                self.name = "Holt".to_string();
            }
        }
        self.values = values.to_vec();
        Ok(())
    }

    fn fitted(&self) -> &[f64] {
        &self.fitted
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        match &self.method {
            Some(Fitted::Ets(model)) => ets_predict(model, horizon),
            Some(Fitted::Holt) => Ok(forecast_holt(&self.values, horizon, self.alpha, self.beta)),
            None => Err(ForecastError::ModelFit("forecast called before fit".to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fit an ETS model once and return it with its in-sample fitted values.
///
/// The fit is rejected unless it yields one finite fitted value per
/// observation.
fn fit_ets(values: &[f64], period: usize, spec: &ETSSpec) -> Result<(ETSModel, Vec<f64>)> {
    use anofox_forecast::core::TimeSeriesBuilder;

    let seasonal_period = if spec.has_seasonal() && period > 1 {
        period
    } else {
        1
    };

    let time_series = TimeSeriesBuilder::new()
        .values(values.to_vec())
        .build()
        .map_err(|e| ForecastError::ModelFit(format!("Failed to build TimeSeries: {}", e)))?;

    let mut forecaster = ETSModel::new(*spec, seasonal_period);
    forecaster
        .fit(&time_series)
        .map_err(|e| ForecastError::ModelFit(format!("Failed to fit ETS model: {}", e)))?;

    let fitted = forecaster
        .fitted_values()
        .map(|v| v.to_vec())
        .ok_or_else(|| ForecastError::ModelFit("ETS model returned no fitted values".to_string()))?;
    if fitted.len() != values.len() || !fitted.iter().all(|v| v.is_finite()) {
        return Err(ForecastError::ModelFit(format!(
            "ETS fitted {} values for {} observations",
            fitted.len(),
            values.len()
        )));
    }

    Ok((forecaster, fitted))
}

/// Point forecast of an already fitted ETS model.
fn ets_predict(model: &ETSModel, horizon: usize) -> Result<Vec<f64>> {
    let forecast = model
        .predict(horizon)
        .map_err(|e| ForecastError::ModelFit(format!("Failed to generate ETS forecasts: {}", e)))?;

    let point = forecast.point().first().cloned().unwrap_or_default();
    if point.len() != horizon {
        return Err(ForecastError::ModelFit(format!(
            "ETS returned {} forecasts for horizon {}",
            point.len(),
            horizon
        )));
    }
    Ok(point)
}

/// Run the Holt recursion; returns one-step-ahead fitted values and the final
/// level and trend.
fn holt_state(values: &[f64], alpha: f64, beta: f64) -> (Vec<f64>, f64, f64) {
    let mut fitted = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return (fitted, 0.0, 0.0);
    };
    let mut level = first;
    let mut trend = values.get(1).map(|v| v - first).unwrap_or(0.0);
    fitted.push(first);

    for &v in values.iter().skip(1) {
        fitted.push(level + trend);
        let prev_level = level;
        level = alpha * v + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }
    (fitted, level, trend)
}

fn holt_fitted(values: &[f64], alpha: f64, beta: f64) -> Vec<f64> {
    holt_state(values, alpha, beta).0
}

fn forecast_holt(values: &[f64], horizon: usize, alpha: f64, beta: f64) -> Vec<f64> {
    let (_, level, trend) = holt_state(values, alpha, beta);
    (1..=horizon).map(|h| level + trend * h as f64).collect()
}
