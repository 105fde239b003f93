//! Regular calendar step grids that models are fitted on.

use crate::error::{ForecastError, Result};
use crate::series::TimeSeriesPoint;
use chrono::{Datelike, Duration, Months, NaiveDateTime, Timelike};
use std::collections::BTreeMap;

/// Spacing of the regular grid models work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StepGranularity {
    Daily,
    Weekly,
    /// Month starts, the spacing of typical case-count sheets.
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl std::str::FromStr for StepGranularity {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "d" | "day" | "daily" => Ok(StepGranularity::Daily),
            "w" | "week" | "weekly" => Ok(StepGranularity::Weekly),
            "ms" | "m" | "month" | "monthly" => Ok(StepGranularity::Monthly),
            "qs" | "q" | "quarter" | "quarterly" => Ok(StepGranularity::Quarterly),
            "ys" | "y" | "year" | "yearly" | "annual" => Ok(StepGranularity::Yearly),
            other => Err(ForecastError::InvalidParameter {
                param: "granularity".to_string(),
                value: other.to_string(),
                reason: "expected daily, weekly, monthly, quarterly or yearly".to_string(),
            }),
        }
    }
}

fn midnight(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_hour(0)
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

impl StepGranularity {
    /// Granularity whose step is closest to a gap of `seconds`.
    fn from_spacing(seconds: i64) -> Self {
        let days = seconds as f64 / 86_400.0;
        if days <= 3.5 {
            StepGranularity::Daily
        } else if days <= 10.0 {
            StepGranularity::Weekly
        } else if days <= 45.0 {
            StepGranularity::Monthly
        } else if days <= 135.0 {
            StepGranularity::Quarterly
        } else {
            StepGranularity::Yearly
        }
    }

    /// Most common spacing between consecutive distinct timestamps.
    ///
    /// Each gap is mapped to the nearest granularity first, so calendar
    /// months of 28 to 31 days vote together. Ties go to the finer
    /// granularity. `None` with fewer than two distinct timestamps.
    pub fn detect(timestamps: &[NaiveDateTime]) -> Option<Self> {
        let mut sorted = timestamps.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut votes: BTreeMap<StepGranularity, usize> = BTreeMap::new();
        for w in sorted.windows(2) {
            let gap = (w[1] - w[0]).num_seconds();
            if gap > 0 {
                *votes.entry(Self::from_spacing(gap)).or_default() += 1;
            }
        }

        votes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(granularity, _)| granularity)
    }

    /// `explicit` if set, else the detected spacing, else monthly.
    pub fn resolve(explicit: Option<Self>, timestamps: &[NaiveDateTime]) -> Self {
        explicit
            .or_else(|| Self::detect(timestamps))
            .unwrap_or_default()
    }

    /// Steps per year, used to pick a seasonal period.
    pub fn steps_per_year(&self) -> usize {
        match self {
            StepGranularity::Daily => 365,
            StepGranularity::Weekly => 52,
            StepGranularity::Monthly => 12,
            StepGranularity::Quarterly => 4,
            StepGranularity::Yearly => 1,
        }
    }

    /// Start of the step containing `dt`.
    pub fn step_start(&self, dt: NaiveDateTime) -> NaiveDateTime {
        let day = midnight(dt);
        match self {
            StepGranularity::Daily => day,
            StepGranularity::Weekly => {
                day - Duration::days(day.weekday().num_days_from_monday() as i64)
            }
            StepGranularity::Monthly => day.with_day(1).unwrap_or(day),
            StepGranularity::Quarterly => {
                let quarter_month = ((day.month() - 1) / 3) * 3 + 1;
                day.with_day(1)
                    .and_then(|d| d.with_month(quarter_month))
                    .unwrap_or(day)
            }
            StepGranularity::Yearly => day
                .with_day(1)
                .and_then(|d| d.with_month(1))
                .unwrap_or(day),
        }
    }

    fn months_per_step(&self) -> Option<i64> {
        match self {
            StepGranularity::Monthly => Some(1),
            StepGranularity::Quarterly => Some(3),
            StepGranularity::Yearly => Some(12),
            _ => None,
        }
    }

    /// Signed number of steps from the step containing `origin` to the step
    /// containing `dt`.
    pub fn step_index(&self, origin: NaiveDateTime, dt: NaiveDateTime) -> i64 {
        let (a, b) = (self.step_start(origin), self.step_start(dt));
        match self.months_per_step() {
            Some(per) => {
                let months = |d: NaiveDateTime| d.year() as i64 * 12 + d.month0() as i64;
                (months(b) - months(a)).div_euclid(per)
            }
            None => {
                let days = (b - a).num_days();
                match self {
                    StepGranularity::Weekly => days.div_euclid(7),
                    _ => days,
                }
            }
        }
    }

    /// Start of the step `k` steps after the step containing `origin`.
    pub fn step_at(&self, origin: NaiveDateTime, k: i64) -> Option<NaiveDateTime> {
        let start = self.step_start(origin);
        match self.months_per_step() {
            Some(per) => {
                let months = u32::try_from((k * per).unsigned_abs()).ok()?;
                if k >= 0 {
                    start.checked_add_months(Months::new(months))
                } else {
                    start.checked_sub_months(Months::new(months))
                }
            }
            None => {
                let days = match self {
                    StepGranularity::Weekly => k.checked_mul(7)?,
                    _ => k,
                };
                start.checked_add_signed(Duration::try_days(days)?)
            }
        }
    }

    /// The `periods` step starts strictly after `last`.
    pub fn steps_after(&self, last: NaiveDateTime, periods: usize) -> Vec<NaiveDateTime> {
        (1..=periods as i64)
            .filter_map(|k| self.step_at(last, k))
            .collect()
    }
}

/// History placed on a regular grid.
#[derive(Debug, Clone)]
pub struct StepGrid {
    pub granularity: StepGranularity,
    /// Start of the first step.
    pub origin: NaiveDateTime,
    /// One value per step; empty steps are linearly interpolated.
    pub values: Vec<f64>,
}

impl StepGrid {
    /// Average observations per step and interpolate empty steps.
    pub fn from_points(points: &[TimeSeriesPoint], granularity: StepGranularity) -> Result<Self> {
        let first = points
            .iter()
            .map(|p| p.timestamp)
            .min()
            .ok_or(ForecastError::InsufficientData { needed: 1, got: 0 })?;
        let origin = granularity.step_start(first);

        let last_idx = points
            .iter()
            .map(|p| granularity.step_index(origin, p.timestamp))
            .max()
            .unwrap_or(0);
        let n_steps = usize::try_from(last_idx + 1)
            .map_err(|_| ForecastError::InvalidInput("timestamps before grid origin".into()))?;

        let mut sums = vec![0.0; n_steps];
        let mut counts = vec![0usize; n_steps];
        for p in points {
            let idx = granularity.step_index(origin, p.timestamp) as usize;
            sums[idx] += p.value;
            counts[idx] += 1;
        }

        let slots: Vec<Option<f64>> = sums
            .iter()
            .zip(counts.iter())
            .map(|(s, &c)| if c > 0 { Some(s / c as f64) } else { None })
            .collect();

        let missing = slots.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            tracing::debug!(missing, steps = n_steps, "interpolating empty grid steps");
        }

        Ok(Self {
            granularity,
            origin,
            values: interpolate_gaps(&slots),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Grid index of an arbitrary timestamp (may be negative or past the end).
    pub fn index_of(&self, dt: NaiveDateTime) -> i64 {
        self.granularity.step_index(self.origin, dt)
    }
}

/// Linear interpolation between known slots. The first slot and the last slot
/// of a grid always hold observations, so only interior gaps exist.
fn interpolate_gaps(slots: &[Option<f64>]) -> Vec<f64> {
    let mut out = Vec::with_capacity(slots.len());
    let mut prev: Option<(usize, f64)> = None;

    for (i, slot) in slots.iter().enumerate() {
        if let Some(v) = *slot {
            if let Some((pi, pv)) = prev {
                let gap = i - pi;
                for j in 1..gap {
                    out.push(pv + (v - pv) * j as f64 / gap as f64);
                }
            }
            out.push(v);
            prev = Some((i, v));
        }
    }
    out
}
