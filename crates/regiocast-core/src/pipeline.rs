//! Request entry points: clean an upload, forecast a cleaned frame.

use crate::assemble::ForecastResult;
use crate::error::Result;
use crate::frame::CleanedFrame;
use crate::mode::resolve_mode;
use crate::model::Backend;
use crate::normalize::normalize;
use crate::orchestrator::{run, ForecastOptions};
use crate::reader::{read_table, EncodingHint};

/// Read an uploaded file and normalize it into a typed frame.
pub fn clean(bytes: &[u8], hint: EncodingHint) -> Result<CleanedFrame> {
    let raw = read_table(bytes, hint)?;
    let frame = normalize(raw);
    tracing::debug!(
        rows = frame.n_rows(),
        columns = frame.n_cols(),
        "cleaned uploaded table"
    );
    Ok(frame)
}

/// Forecast `target_column` per region with default options.
///
/// `mode` accepts the names understood by [`resolve_mode`].
pub fn generate_forecast(
    frame: &CleanedFrame,
    target_column: &str,
    region_column: &str,
    backend: Backend,
    periods: usize,
    mode: &str,
) -> Result<ForecastResult> {
    let options = ForecastOptions {
        target_column: target_column.to_string(),
        region_column: region_column.to_string(),
        backend,
        periods,
        mode: resolve_mode(mode)?,
        ..Default::default()
    };
    generate_forecast_with(frame, &options)
}

/// Forecast with explicit options.
#[tracing::instrument(
    skip(frame, options),
    fields(
        target = %options.target_column,
        mode = %options.mode,
        backend = options.backend.name()
    )
)]
pub fn generate_forecast_with(
    frame: &CleanedFrame,
    options: &ForecastOptions,
) -> Result<ForecastResult> {
    run(frame, options)
}
