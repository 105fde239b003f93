//! Parameter conversion utilities for FFI functions.
//!
//! This module provides helper functions for converting C types to Rust types
//! with common patterns like "0 or negative means None".

use crate::types::{
    ForecastOptions as FfiForecastOptions, REGIOCAST_HINT_AUTO, REGIOCAST_HINT_CSV,
    REGIOCAST_HINT_EXCEL,
};
use core::ffi::{c_char, c_int};
use regiocast_core::{
    EncodingHint, ForecastError, ForecastOptions, Result, RunControl, StepGranularity,
};
use std::ffi::CStr;
use std::time::Duration;

/// Convert a `c_int` to `Option<usize>`, where values <= 0 become None.
#[inline]
pub fn to_option_usize(value: c_int) -> Option<usize> {
    if value > 0 {
        Some(value as usize)
    } else {
        None
    }
}

/// Map a `regiocast_clean` hint value onto the core hint.
pub fn to_encoding_hint(value: c_int) -> Result<EncodingHint> {
    match value {
        REGIOCAST_HINT_CSV => Ok(EncodingHint::Csv),
        REGIOCAST_HINT_EXCEL => Ok(EncodingHint::Excel),
        REGIOCAST_HINT_AUTO => Ok(EncodingHint::Auto),
        other => Err(ForecastError::InvalidInput(format!(
            "unknown encoding hint {}",
            other
        ))),
    }
}

/// Convert a C string pointer to an owned string, `None` for NULL.
///
/// # Safety
/// The pointer must be null or point to a valid null-terminated string.
pub unsafe fn c_str_to_option(ptr: *const c_char, name: &str) -> Result<Option<String>> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|_| ForecastError::InvalidInput(format!("{} is not valid UTF-8", name)))
}

/// Read a fixed-size, null-terminated buffer.
fn buffer_to_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Parse a buffer with `FromStr`, falling back to `default` when empty.
fn parse_buffer<T>(buf: &[c_char], default: T) -> Result<T>
where
    T: std::str::FromStr<Err = ForecastError>,
{
    let s = buffer_to_string(buf);
    if s.is_empty() {
        Ok(default)
    } else {
        s.parse()
    }
}

/// Empty or "auto" leaves the granularity to detection.
fn parse_granularity(buf: &[c_char]) -> Result<Option<StepGranularity>> {
    let s = buffer_to_string(buf);
    if s.is_empty() || s.eq_ignore_ascii_case("auto") {
        Ok(None)
    } else {
        s.parse().map(Some)
    }
}

/// Build core forecast options from the C options struct.
///
/// # Safety
/// The string pointers inside `opts` must be null or valid null-terminated
/// strings.
pub unsafe fn to_core_options(opts: &FfiForecastOptions) -> Result<ForecastOptions> {
    let defaults = ForecastOptions::default();

    let target_column = c_str_to_option(opts.target_column, "target_column")?
        .ok_or_else(|| ForecastError::InvalidInput("target_column is required".to_string()))?;
    let region_column =
        c_str_to_option(opts.region_column, "region_column")?.unwrap_or(defaults.region_column);
    let date_column = c_str_to_option(opts.date_column, "date_column")?;

    let mut control = RunControl::new();
    if let Some(ms) = to_option_usize(opts.deadline_ms) {
        control = control.with_deadline(Duration::from_millis(ms as u64));
    }
    if let Some(max) = to_option_usize(opts.max_fits) {
        control = control.with_max_fits(max);
    }

    Ok(ForecastOptions {
        target_column,
        region_column,
        date_column,
        mode: parse_buffer(&opts.mode, defaults.mode)?,
        backend: parse_buffer(&opts.backend, defaults.backend)?,
        granularity: parse_granularity(&opts.granularity)?,
        duplicates: parse_buffer(&opts.duplicates, defaults.duplicates)?,
        periods: to_option_usize(opts.periods).unwrap_or(defaults.periods),
        min_history: to_option_usize(opts.min_history).unwrap_or(defaults.min_history),
        control,
    })
}
