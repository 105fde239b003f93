//! Rolling strategy: a walk-forward backtest of one-step-ahead predictions.
//!
//! For every unique timestamp except the last, a fresh model is trained on
//! the points at or before that cutoff and asked for the next unique
//! timestamp. Steps are independent and run on the rayon pool.

use crate::control::RunTracker;
use crate::error::{ForecastError, Result};
use crate::model::{fit_predict_with, ModelFactory};
use crate::series::{actual_at, ForecastPoint, TimeSeriesPoint};
use chrono::NaiveDateTime;
use rayon::prelude::*;

/// Default number of points a training window needs.
pub const DEFAULT_MIN_HISTORY: usize = 6;

/// A rolling step that was attempted but produced no prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub cutoff: NaiveDateTime,
    pub target: NaiveDateTime,
    pub error: ForecastError,
}

/// Predictions of all successful steps, sorted by timestamp, and the failed
/// steps.
#[derive(Debug, Clone, Default)]
pub struct RollingOutcome {
    pub points: Vec<ForecastPoint>,
    pub failures: Vec<StepFailure>,
}

enum Step {
    Predicted(ForecastPoint),
    Failed(StepFailure),
}

/// Run the walk-forward backtest over `series`.
///
/// Steps whose training window has fewer than `min_history` points are
/// skipped. Recoverable fit errors are reported in
/// [`RollingOutcome::failures`]; control errors abort the whole run.
pub fn run_rolling(
    series: &[TimeSeriesPoint],
    min_history: usize,
    factory: &dyn ModelFactory,
    control: &RunTracker,
) -> Result<RollingOutcome> {
    if min_history == 0 {
        return Err(ForecastError::InvalidParameter {
            param: "min_history".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let mut sorted = series.to_vec();
    sorted.sort_by_key(|p| p.timestamp);
    let mut cutoffs: Vec<NaiveDateTime> = sorted.iter().map(|p| p.timestamp).collect();
    cutoffs.dedup();

    let steps = cutoffs
        .par_windows(2)
        .filter_map(|w| {
            let (cutoff, target) = (w[0], w[1]);
            let train = &sorted[..sorted.partition_point(|p| p.timestamp <= cutoff)];
            if train.len() < min_history {
                let reason = ForecastError::InsufficientHistory {
                    needed: min_history,
                    got: train.len(),
                };
                tracing::debug!(%cutoff, %reason, "skipping rolling step");
                return None;
            }
            Some(run_step(train, cutoff, target, &sorted, factory, control))
        })
        .collect::<Result<Vec<Step>>>()?;

    let mut outcome = RollingOutcome::default();
    for step in steps {
        match step {
            Step::Predicted(point) => outcome.points.push(point),
            Step::Failed(failure) => outcome.failures.push(failure),
        }
    }
    outcome.points.sort_by_key(|p| p.timestamp);
    outcome.failures.sort_by_key(|f| f.cutoff);
    Ok(outcome)
}

fn run_step(
    train: &[TimeSeriesPoint],
    cutoff: NaiveDateTime,
    target: NaiveDateTime,
    observed: &[TimeSeriesPoint],
    factory: &dyn ModelFactory,
    control: &RunTracker,
) -> Result<Step> {
    control.check_fit()?;
    match fit_predict_with(factory, train, &[target]) {
        Ok(predicted) => {
            let value = predicted.get(&target).copied().ok_or_else(|| {
                ForecastError::ModelFit(format!("no prediction returned for {}", target))
            })?;
            Ok(Step::Predicted(ForecastPoint {
                timestamp: target,
                predicted: value,
                actual: actual_at(observed, target),
            }))
        }
        Err(error) if error.is_recoverable() => {
            tracing::warn!(%cutoff, %target, error = %error, "rolling step failed");
            Ok(Step::Failed(StepFailure {
                cutoff,
                target,
                error,
            }))
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RunControl;
    use crate::model::{ModelSpec, SeriesModel};
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    fn month(i: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020 + (i / 12) as i32, i % 12 + 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn series(n: u32) -> Vec<TimeSeriesPoint> {
        (0..n)
            .map(|i| TimeSeriesPoint::new(month(i), 100.0 + 3.0 * i as f64))
            .collect()
    }

    /// Records the newest training timestamp and the requested timestamps of
    /// every fit.
    struct Recorder {
        log: Arc<Mutex<Vec<(NaiveDateTime, usize, Vec<NaiveDateTime>)>>>,
        trained: Option<(NaiveDateTime, usize, f64)>,
    }

    impl SeriesModel for Recorder {
        fn fit(&mut self, history: &[TimeSeriesPoint]) -> Result<()> {
            let newest = history.iter().map(|p| p.timestamp).max().unwrap();
            let last = history.last().unwrap().value;
            self.trained = Some((newest, history.len(), last));
            Ok(())
        }

        fn predict(&self, timestamps: &[NaiveDateTime]) -> Result<Vec<f64>> {
            let (newest, len, last) = self.trained.unwrap();
            self.log
                .lock()
                .unwrap()
                .push((newest, len, timestamps.to_vec()));
            Ok(vec![last; timestamps.len()])
        }

        fn name(&self) -> &str {
            "Recorder"
        }
    }

    fn recorder(
        log: &Arc<Mutex<Vec<(NaiveDateTime, usize, Vec<NaiveDateTime>)>>>,
    ) -> impl ModelFactory {
        let log = Arc::clone(log);
        move || -> Box<dyn SeriesModel> {
            Box::new(Recorder {
                log: Arc::clone(&log),
                trained: None,
            })
        }
    }

    #[test]
    fn test_no_leakage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let factory = recorder(&log);
        let s = series(10);

        let out = run_rolling(&s, 6, &factory, &RunControl::new().start()).unwrap();
        assert_eq!(out.points.len(), 4);
        assert!(out.failures.is_empty());

        let mut calls = log.lock().unwrap().clone();
        calls.sort_by_key(|c| c.0);
        let sizes: Vec<usize> = calls.iter().map(|c| c.1).collect();
        assert_eq!(sizes, vec![6, 7, 8, 9]);
        for (newest, _, requested) in &calls {
            assert_eq!(requested.len(), 1);
            assert!(*newest < requested[0]);
            let idx = s.iter().position(|p| p.timestamp == *newest).unwrap();
            assert_eq!(requested[0], s[idx + 1].timestamp);
        }
    }

    #[test]
    fn test_min_history_controls_step_count() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let factory = recorder(&log);
        let s = series(10);

        let out = run_rolling(&s, 7, &factory, &RunControl::new().start()).unwrap();
        let stamps: Vec<NaiveDateTime> = out.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![month(7), month(8), month(9)]);
        assert!(out.points.iter().all(|p| p.actual.is_some()));
        assert_eq!(out.points[0].predicted, s[6].value);
    }

    #[test]
    fn test_too_short_series_yields_nothing() {
        let out = run_rolling(&series(6), 6, &ModelSpec::default(), &RunControl::new().start()).unwrap();
        assert!(out.points.is_empty());
        assert!(out.failures.is_empty());
    }

    #[test]
    fn test_failed_step_is_reported() {
        let factory = || -> Box<dyn SeriesModel> {
            struct Failing;
            impl SeriesModel for Failing {
                fn fit(&mut self, history: &[TimeSeriesPoint]) -> Result<()> {
                    if history.len() == 7 {
                        return Err(ForecastError::ModelFit("singular".into()));
                    }
                    Ok(())
                }
                fn predict(&self, timestamps: &[NaiveDateTime]) -> Result<Vec<f64>> {
                    Ok(vec![1.0; timestamps.len()])
                }
                fn name(&self) -> &str {
                    "Failing"
                }
            }
            Box::new(Failing)
        };

        let out = run_rolling(&series(10), 6, &factory, &RunControl::new().start()).unwrap();
        assert_eq!(out.points.len(), 3);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].cutoff, month(6));
        assert_eq!(out.failures[0].target, month(7));
    }

    #[test]
    fn test_cancel_aborts() {
        let control = RunControl::new();
        control.cancel.cancel();
        let err = run_rolling(&series(10), 6, &ModelSpec::default(), &control.start()).unwrap_err();
        assert_eq!(err, ForecastError::Cancelled);
    }

    #[test]
    fn test_real_backend_predictions() {
        let out = run_rolling(&series(14), 6, &ModelSpec::default(), &RunControl::new().start()).unwrap();
        assert_eq!(out.points.len(), 8);
        assert!(out.points.iter().all(|p| p.predicted.is_finite()));
    }
}
