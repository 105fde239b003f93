//! Chart data: x/y pairs of a cleaned frame, one series per region when the
//! frame has a region column.

use crate::error::{ForecastError, Result};
use crate::frame::{CleanedFrame, ColumnData};
use crate::orchestrator::column_timestamps;
use std::collections::BTreeMap;

/// One plotted line. `x` holds the display form of the x cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartSeries {
    pub x: Vec<String>,
    pub y: Vec<f64>,
}

impl ChartSeries {
    fn push(&mut self, x: String, y: f64) {
        self.x.push(x);
        self.y.push(y);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chart {
    /// The frame has no region column.
    Single(ChartSeries),
    /// Series keyed by region, in key order.
    Grouped(BTreeMap<String, ChartSeries>),
}

/// Collect `y_column` against `x_column`.
///
/// Rows are ordered by x when the x column holds dates; rows without a date
/// go last. Otherwise the frame order is kept. When `region_column` names a
/// column of the frame the rows are split per region, else one series is
/// returned.
pub fn chart_series(
    frame: &CleanedFrame,
    x_column: &str,
    y_column: &str,
    region_column: Option<&str>,
) -> Result<Chart> {
    let x = frame.find_column(x_column)?;
    let y = frame.find_column(y_column)?;
    let values = match &y.data {
        ColumnData::Numeric(v) => v,
        other => {
            return Err(ForecastError::InvalidInput(format!(
                "Column '{}' is {}, expected numeric",
                y.name,
                other.column_type().name()
            )))
        }
    };
    let region = region_column.and_then(|name| frame.find_column(name).ok());

    let mut order: Vec<usize> = (0..frame.n_rows()).collect();
    if let Some(timestamps) = column_timestamps(x) {
        // Stable, so rows sharing a date keep the frame order.
        order.sort_by_key(|&row| (timestamps[row].is_none(), timestamps[row]));
    }

    let chart = match region {
        Some(region) => {
            let mut groups: BTreeMap<String, ChartSeries> = BTreeMap::new();
            for row in order {
                groups
                    .entry(region.data.display(row))
                    .or_default()
                    .push(x.data.display(row), values[row]);
            }
            tracing::debug!(x = %x.name, y = %y.name, regions = groups.len(), "grouped chart");
            Chart::Grouped(groups)
        }
        None => {
            let mut series = ChartSeries::default();
            for row in order {
                series.push(x.data.display(row), values[row]);
            }
            tracing::debug!(x = %x.name, y = %y.name, points = series.len(), "single chart");
            Chart::Single(series)
        }
    };
    Ok(chart)
}
