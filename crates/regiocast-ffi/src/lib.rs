//! FFI boundary layer for the regiocast forecasting core.
//!
//! This crate provides C-compatible functions for the API server: clean an
//! uploaded table into an opaque frame, preview it, and forecast it. Results
//! cross the boundary as malloc'd JSON strings.

pub mod allocation;
pub mod conversion;
pub mod error_handling;
pub mod json;
pub mod logging;
pub mod types;

use libc::{c_char, c_int, size_t};
use regiocast_core::ForecastError;
use std::ptr;

pub use types::*;

use allocation::{alloc_and_copy_string, free_ptr};
use conversion::{c_str_to_option, to_core_options, to_encoding_hint};
use error_handling::{init_error, set_error};

// ============================================================================
// Cleaning
// ============================================================================

/// Read and normalize an uploaded CSV or Excel file.
///
/// `hint` is one of the `REGIOCAST_HINT_*` values. On success `*out_frame`
/// receives a frame handle that must be released with `regiocast_free_frame`.
///
/// # Safety
/// `bytes` must point to `length` readable bytes. `out_frame` must be valid.
/// `out_error` must be valid or null.
#[no_mangle]
pub unsafe extern "C" fn regiocast_clean(
    bytes: *const u8,
    length: size_t,
    hint: c_int,
    out_frame: *mut *mut RegiocastFrame,
    out_error: *mut RegiocastError,
) -> bool {
    ffi_execute!(out_error, [bytes, out_frame], {
        *out_frame = ptr::null_mut();
        let hint = to_encoding_hint(hint)?;
        let data = std::slice::from_raw_parts(bytes, length);
        let frame = regiocast_core::clean(data, hint)?;
        *out_frame = Box::into_raw(Box::new(RegiocastFrame { frame }));
        Ok::<bool, ForecastError>(true)
    })
}

/// Column names and the first `n_rows` rows of a frame as JSON.
///
/// The string must be released with `regiocast_free_string`.
///
/// # Safety
/// `frame` must be a live handle from `regiocast_clean`. `out_json` must be
/// valid. `out_error` must be valid or null.
#[no_mangle]
pub unsafe extern "C" fn regiocast_frame_preview(
    frame: *const RegiocastFrame,
    n_rows: size_t,
    out_json: *mut *mut c_char,
    out_error: *mut RegiocastError,
) -> bool {
    ffi_execute!(out_error, [frame, out_json], {
        let payload = json::preview_json((*frame).frame(), n_rows);
        Ok::<bool, ForecastError>(alloc_and_copy_string(&payload, out_json, out_error))
    })
}

/// Chart data of `y_column` against `x_column` as JSON.
///
/// With a `region_column` present in the frame the payload is
/// `{"multi_series": {region: {"x", "y"}}}`, otherwise `{"x", "y"}`. Rows are
/// sorted by x when it holds dates. `region_column` may be NULL. The string
/// must be released with `regiocast_free_string`.
///
/// # Safety
/// `frame` must be a live handle from `regiocast_clean`. The column names
/// must be valid null-terminated strings, `region_column` may be null.
/// `out_json` must be valid. `out_error` must be valid or null.
#[no_mangle]
pub unsafe extern "C" fn regiocast_chart_series(
    frame: *const RegiocastFrame,
    x_column: *const c_char,
    y_column: *const c_char,
    region_column: *const c_char,
    out_json: *mut *mut c_char,
    out_error: *mut RegiocastError,
) -> bool {
    ffi_execute!(out_error, [frame, x_column, y_column, out_json], {
        *out_json = ptr::null_mut();
        let x = c_str_to_option(x_column, "x_column")?.unwrap_or_default();
        let y = c_str_to_option(y_column, "y_column")?.unwrap_or_default();
        let region = c_str_to_option(region_column, "region_column")?;
        let chart = regiocast_core::chart_series((*frame).frame(), &x, &y, region.as_deref())?;
        Ok::<bool, ForecastError>(alloc_and_copy_string(&json::chart_json(&chart), out_json, out_error))
    })
}

/// Number of rows in a frame, 0 for NULL.
///
/// # Safety
/// `frame` must be a live handle or null.
#[no_mangle]
pub unsafe extern "C" fn regiocast_frame_n_rows(frame: *const RegiocastFrame) -> size_t {
    if frame.is_null() {
        return 0;
    }
    (*frame).frame().n_rows()
}

// ============================================================================
// Forecasting
// ============================================================================

/// Forecast a cleaned frame per region.
///
/// On success `*out_json` receives
/// `{"mode", "forecast": {region: [{"ds", "yhat", "actual"}]}, "diagnostics"}`,
/// to be released with `regiocast_free_string`.
///
/// # Safety
/// `frame` must be a live handle, `options` must point to a valid options
/// struct whose string fields are null or null-terminated. `out_json` must be
/// valid. `out_error` must be valid or null.
#[no_mangle]
pub unsafe extern "C" fn regiocast_generate_forecast(
    frame: *const RegiocastFrame,
    options: *const ForecastOptions,
    out_json: *mut *mut c_char,
    out_error: *mut RegiocastError,
) -> bool {
    ffi_execute!(out_error, [frame, options, out_json], {
        *out_json = ptr::null_mut();
        let core_opts = to_core_options(&*options)?;
        let result = regiocast_core::generate_forecast_with((*frame).frame(), &core_opts)?;
        let payload = json::forecast_json(&result);
        Ok::<bool, ForecastError>(alloc_and_copy_string(&payload, out_json, out_error))
    })
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a frame handle.
///
/// # Safety
/// The frame pointer must come from `regiocast_clean` or be null, and must
/// not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn regiocast_free_frame(frame: *mut RegiocastFrame) {
    if frame.is_null() {
        return;
    }
    drop(Box::from_raw(frame));
}

/// Free a string returned by this library.
///
/// # Safety
/// The pointer must come from this library or be null.
#[no_mangle]
pub unsafe extern "C" fn regiocast_free_string(s: *mut c_char) {
    free_ptr(s as *mut libc::c_void);
}

// ============================================================================
// Logging
// ============================================================================

/// Install a stderr log subscriber.
///
/// `filter` uses `RUST_LOG` syntax; NULL falls back to `RUST_LOG`, then to
/// info level for this library.
///
/// # Safety
/// `filter` must be null or a valid null-terminated string. `out_error` must
/// be valid or null.
#[no_mangle]
pub unsafe extern "C" fn regiocast_init_logging(
    filter: *const c_char,
    out_error: *mut RegiocastError,
) -> bool {
    init_error(out_error);
    let filter = match c_str_to_option(filter, "filter") {
        Ok(f) => f,
        Err(e) => {
            set_error(out_error, ErrorCode::InvalidInput, &e.to_string());
            return false;
        }
    };
    match logging::init_logging(filter.as_deref()) {
        Ok(()) => true,
        Err(msg) => {
            set_error(out_error, ErrorCode::InvalidInput, &msg);
            false
        }
    }
}

// ============================================================================
// Version
// ============================================================================

#[no_mangle]
pub extern "C" fn regiocast_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}
