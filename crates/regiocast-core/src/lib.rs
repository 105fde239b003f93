//! Core library for regional case-count forecasting.
//!
//! Cleans uploaded CSV/Excel tables into typed frames and forecasts a target
//! column per region, either as a single long-horizon projection or as a
//! walk-forward backtest of one-step-ahead predictions. Also extracts x/y
//! chart series from a cleaned frame.

pub mod arnet;
pub mod assemble;
pub mod chart;
pub mod control;
pub mod error;
pub mod frame;
pub mod grid;
pub mod longterm;
pub mod mode;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod reader;
pub mod rolling;
pub mod series;
pub mod smoothing;

// Re-exports for convenience
pub use assemble::{assemble, Diagnostic, ForecastResult};
pub use chart::{chart_series, Chart, ChartSeries};
pub use control::{CancelToken, RunControl, RunTracker, DEFAULT_DEADLINE};
pub use error::{ForecastError, Result};
pub use frame::{column_key, CleanedFrame, Column, ColumnData, ColumnType};
pub use grid::{StepGranularity, StepGrid};
pub use longterm::run_longterm;
pub use mode::{resolve_mode, ForecastMode};
pub use model::{
    fit_predict, fit_predict_with, Backend, GridForecaster, GridModel, ModelFactory, ModelSpec,
    SeriesModel,
};
pub use normalize::{normalize, normalize_with, NormalizeOptions};
pub use orchestrator::{run, run_with_factory, ForecastOptions};
pub use pipeline::{clean, generate_forecast, generate_forecast_with};
pub use reader::{read_table, Cell, EncodingHint, RawTable};
pub use rolling::{run_rolling, RollingOutcome, StepFailure, DEFAULT_MIN_HISTORY};
pub use series::{DuplicatePolicy, ForecastPoint, TimeSeriesPoint};
