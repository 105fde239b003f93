//! Neural backend: an autoregressive network in the AR-Net style.
//!
//! The series is standardized, a linear autoregression over `p` lags is fit
//! by OLS, and a single tanh hidden layer is trained on the linear residuals
//! by full-batch gradient descent. Weights start from a fixed deterministic
//! pattern, so identical input always gives identical output.
//!
//! Forecasts beyond one step are produced recursively from the model's own
//! predictions.

use crate::error::{ForecastError, Result};
use crate::model::GridForecaster;
use anofox_regression::prelude::*;

/// Standard deviation below which a series is treated as constant.
const CONSTANT_EPS: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct ArNet {
    /// Upper bound on the number of lags.
    pub max_lags: usize,
    /// Width of the hidden layer.
    pub hidden: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// L2 penalty on the hidden-layer weights.
    pub weight_decay: f64,
    fitted: Vec<f64>,
    state: Option<State>,
}

impl Default for ArNet {
    fn default() -> Self {
        Self {
            max_lags: 12,
            hidden: 8,
            epochs: 300,
            learning_rate: 0.05,
            weight_decay: 1e-3,
            fitted: Vec::new(),
            state: None,
        }
    }
}

#[derive(Debug, Clone)]
enum State {
    Constant(f64),
    /// Too few observations for a regression: last value plus mean step.
    Drift { last: f64, slope: f64 },
    Network(Box<Network>),
}

#[derive(Debug, Clone)]
struct Network {
    mean: f64,
    scale: f64,
    /// Linear part: intercept and one coefficient per lag, most recent first.
    intercept: f64,
    ar: Vec<f64>,
    hidden: HiddenLayer,
    /// Last `p` standardized observations, oldest first.
    tail: Vec<f64>,
}

#[derive(Debug, Clone)]
struct HiddenLayer {
    w1: Vec<Vec<f64>>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: f64,
}

impl HiddenLayer {
    /// Fixed starting weights, small and distinct per unit.
    fn init(units: usize, inputs: usize) -> Self {
        let w1 = (0..units)
            .map(|k| {
                (0..inputs)
                    .map(|j| 0.3 * ((k * inputs + j) as f64 + 1.0).sin())
                    .collect()
            })
            .collect();
        let w2 = (0..units).map(|k| 0.1 * (k as f64 + 1.0).cos()).collect();
        Self {
            w1,
            b1: vec![0.0; units],
            w2,
            b2: 0.0,
        }
    }

    fn activations(&self, x: &[f64]) -> Vec<f64> {
        self.w1
            .iter()
            .zip(self.b1.iter())
            .map(|(w, b)| (b + w.iter().zip(x).map(|(wi, xi)| wi * xi).sum::<f64>()).tanh())
            .collect()
    }

    fn output(&self, x: &[f64]) -> f64 {
        self.b2
            + self
                .activations(x)
                .iter()
                .zip(self.w2.iter())
                .map(|(h, w)| h * w)
                .sum::<f64>()
    }

    fn loss(&self, xs: &[Vec<f64>], targets: &[f64]) -> f64 {
        let m = targets.len() as f64;
        xs.iter()
            .zip(targets)
            .map(|(x, t)| (self.output(x) - t).powi(2))
            .sum::<f64>()
            / m
    }

    /// One full-batch gradient step on mean squared error plus L2.
    fn step(&mut self, xs: &[Vec<f64>], targets: &[f64], lr: f64, decay: f64) {
        let units = self.w2.len();
        let inputs = xs.first().map(|x| x.len()).unwrap_or(0);
        let m = targets.len() as f64;

        let mut g_w1 = vec![vec![0.0; inputs]; units];
        let mut g_b1 = vec![0.0; units];
        let mut g_w2 = vec![0.0; units];
        let mut g_b2 = 0.0;

        for (x, t) in xs.iter().zip(targets) {
            let h = self.activations(x);
            let out = self.b2 + h.iter().zip(&self.w2).map(|(a, w)| a * w).sum::<f64>();
            let d_out = 2.0 * (out - t) / m;
            g_b2 += d_out;
            for k in 0..units {
                g_w2[k] += d_out * h[k];
                let d_h = d_out * self.w2[k] * (1.0 - h[k] * h[k]);
                g_b1[k] += d_h;
                for (g, xi) in g_w1[k].iter_mut().zip(x) {
                    *g += d_h * xi;
                }
            }
        }

        for k in 0..units {
            for (w, g) in self.w1[k].iter_mut().zip(&g_w1[k]) {
                *w -= lr * (g + 2.0 * decay * *w);
            }
            self.b1[k] -= lr * g_b1[k];
            self.w2[k] -= lr * (g_w2[k] + 2.0 * decay * self.w2[k]);
        }
        self.b2 -= lr * g_b2;
    }

    fn disabled(units: usize, inputs: usize) -> Self {
        Self {
            w1: vec![vec![0.0; inputs]; units],
            b1: vec![0.0; units],
            w2: vec![0.0; units],
            b2: 0.0,
        }
    }
}

impl Network {
    fn lags(&self) -> usize {
        self.ar.len()
    }

    /// Standardized one-step prediction from lags, most recent first.
    fn predict_z(&self, lags: &[f64]) -> f64 {
        self.intercept
            + self.ar.iter().zip(lags).map(|(a, x)| a * x).sum::<f64>()
            + self.hidden.output(lags)
    }

    fn destandardize(&self, z: f64) -> f64 {
        z * self.scale + self.mean
    }
}

/// Lag count for `n` observations: about a quarter of the history, capped,
/// and small enough to leave more regression rows than parameters.
fn lag_count(n: usize, max_lags: usize) -> usize {
    let p = (n / 4).clamp(1, max_lags.max(1));
    p.min(n.saturating_sub(2) / 2).max(1)
}

/// Lag rows (most recent first) and targets for a standardized series.
fn lag_matrix(z: &[f64], p: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    (p..z.len())
        .map(|t| ((0..p).map(|j| z[t - 1 - j]).collect(), z[t]))
        .unzip()
}

/// OLS fit of the linear autoregression; returns intercept and lag
/// coefficients. Aliased coefficients come back as zero.
fn fit_linear(xs: &[Vec<f64>], y: &[f64], p: usize) -> Result<(f64, Vec<f64>)> {
    let m = y.len();
    let x_mat = faer::Mat::from_fn(m, p, |i, j| xs[i][j]);
    let y_col = faer::Col::from_fn(m, |i| y[i]);

    let fitted = OlsRegressor::builder()
        .with_intercept(true)
        .build()
        .fit(&x_mat, &y_col)
        .map_err(|e| ForecastError::ModelFit(format!("AR regression failed: {}", e)))?;

    let intercept = fitted.intercept().unwrap_or(0.0);
    let coeffs_col = fitted.coefficients();
    let ar: Vec<f64> = (0..coeffs_col.nrows())
        .map(|i| coeffs_col[i])
        .map(|c| if c.is_finite() { c } else { 0.0 })
        .collect();

    if ar.len() != p || !intercept.is_finite() {
        return Err(ForecastError::ModelFit(format!(
            "AR regression returned {} coefficients for {} lags",
            ar.len(),
            p
        )));
    }
    Ok((intercept, ar))
}

impl ArNet {
    fn fit_network(&self, values: &[f64], mean: f64, scale: f64) -> Result<Network> {
        let z: Vec<f64> = values.iter().map(|v| (v - mean) / scale).collect();
        let mut p = lag_count(z.len(), self.max_lags);

        let (xs, y, intercept, ar) = loop {
            let (xs, y) = lag_matrix(&z, p);
            match fit_linear(&xs, &y, p) {
                Ok((intercept, ar)) => break (xs, y, intercept, ar),
                Err(e) if p > 1 => {
                    tracing::debug!(error = %e, lags = p, "retrying AR fit with one lag");
                    p = 1;
                }
                Err(e) => return Err(e),
            }
        };

        let residuals: Vec<f64> = xs
            .iter()
            .zip(&y)
            .map(|(x, t)| t - intercept - ar.iter().zip(x).map(|(a, xi)| a * xi).sum::<f64>())
            .collect();

        let mut hidden = HiddenLayer::init(self.hidden, p);
        for _ in 0..self.epochs {
            hidden.step(&xs, &residuals, self.learning_rate, self.weight_decay);
        }
        if !hidden.loss(&xs, &residuals).is_finite() {
            tracing::warn!(lags = p, "hidden layer diverged, keeping linear part only");
            hidden = HiddenLayer::disabled(self.hidden, p);
        }

        Ok(Network {
            mean,
            scale,
            intercept,
            ar,
            hidden,
            tail: z[z.len() - p..].to_vec(),
        })
    }
}

impl GridForecaster for ArNet {
    fn fit_values(&mut self, values: &[f64], _steps_per_year: usize) -> Result<()> {
        let n = values.len();
        if n < 2 {
            return Err(ForecastError::InsufficientData { needed: 2, got: n });
        }

        let mean = values.iter().sum::<f64>() / n as f64;
        let scale = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();

        let (state, fitted) = if scale < CONSTANT_EPS {
            (State::Constant(mean), vec![mean; n])
        } else if n - lag_count(n, self.max_lags) < lag_count(n, self.max_lags) + 2 {
            let slope = (values[n - 1] - values[0]) / (n - 1) as f64;
            let mut fitted = vec![values[0]];
            fitted.extend(values[..n - 1].iter().map(|v| v + slope));
            (
                State::Drift {
                    last: values[n - 1],
                    slope,
                },
                fitted,
            )
        } else {
            let net = self.fit_network(values, mean, scale)?;
            let p = net.lags();
            let z: Vec<f64> = values.iter().map(|v| (v - mean) / scale).collect();
            let mut fitted = vec![mean; p];
            fitted.extend((p..n).map(|t| {
                let lags: Vec<f64> = (0..p).map(|j| z[t - 1 - j]).collect();
                net.destandardize(net.predict_z(&lags))
            }));
            (State::Network(Box::new(net)), fitted)
        };

        self.fitted = fitted;
        self.state = Some(state);
        Ok(())
    }

    fn fitted(&self) -> &[f64] {
        &self.fitted
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        match &self.state {
            Some(State::Constant(c)) => Ok(vec![*c; horizon]),
            Some(State::Drift { last, slope }) => {
                Ok((1..=horizon).map(|h| last + slope * h as f64).collect())
            }
            Some(State::Network(net)) => {
                let mut window = net.tail.clone();
                let mut out = Vec::with_capacity(horizon);
                for _ in 0..horizon {
                    let lags: Vec<f64> = window.iter().rev().copied().collect();
                    let z = net.predict_z(&lags);
                    out.push(net.destandardize(z));
                    window.remove(0);
                    window.push(z);
                }
                Ok(out)
            }
            None => Err(ForecastError::ModelFit("forecast called before fit".to_string())),
        }
    }

    fn name(&self) -> &str {
        "ArNet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn seasonal(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                50.0 + 0.5 * i as f64
                    + 8.0 * (i as f64 * std::f64::consts::TAU / 12.0).sin()
                    + 0.3 * ((i * 7) % 5) as f64
            })
            .collect()
    }

    #[test]
    fn test_lag_count() {
        assert_eq!(lag_count(4, 12), 1);
        assert_eq!(lag_count(24, 12), 6);
        assert_eq!(lag_count(200, 12), 12);
        assert_eq!(lag_count(10, 12), 2);
    }

    #[test]
    fn test_lag_matrix_most_recent_first() {
        let (xs, y) = lag_matrix(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(xs, vec![vec![2.0, 1.0], vec![3.0, 2.0]]);
        assert_eq!(y, vec![3.0, 4.0]);
    }

    #[test]
    fn test_constant_series() {
        let mut model = ArNet::default();
        model.fit_values(&[7.0; 10], 12).unwrap();
        assert_eq!(model.fitted(), &[7.0; 10]);
        assert_eq!(model.forecast(3).unwrap(), vec![7.0; 3]);
    }

    #[test]
    fn test_short_series_uses_drift() {
        let mut model = ArNet::default();
        model.fit_values(&[1.0, 3.0, 5.0], 12).unwrap();
        let fc = model.forecast(2).unwrap();
        assert_relative_eq!(fc[0], 7.0);
        assert_relative_eq!(fc[1], 9.0);
        assert_eq!(model.fitted().len(), 3);
    }

    #[test]
    fn test_deterministic() {
        let values = seasonal(36);
        let mut a = ArNet::default();
        let mut b = ArNet::default();
        a.fit_values(&values, 12).unwrap();
        b.fit_values(&values, 12).unwrap();
        assert_eq!(a.fitted(), b.fitted());
        assert_eq!(a.forecast(6).unwrap(), b.forecast(6).unwrap());
    }

    #[test]
    fn test_forecast_is_finite_and_plausible() {
        let values = seasonal(48);
        let mut model = ArNet::default();
        model.fit_values(&values, 12).unwrap();
        assert_eq!(model.fitted().len(), values.len());

        let fc = model.forecast(12).unwrap();
        assert_eq!(fc.len(), 12);
        let (lo, hi) = (0.0, 150.0);
        assert!(fc.iter().all(|v| v.is_finite() && *v > lo && *v < hi), "{:?}", fc);
    }

    #[test]
    fn test_too_short() {
        let mut model = ArNet::default();
        assert!(matches!(
            model.fit_values(&[1.0], 12),
            Err(ForecastError::InsufficientData { needed: 2, got: 1 })
        ));
    }
}
