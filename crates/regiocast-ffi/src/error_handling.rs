//! Error reporting shared by the exported functions.

use crate::types::{ErrorCode, RegiocastError};
use core::ffi::c_void;
use regiocast_core::ForecastError;

/// Reset the caller's error slot.
///
/// # Safety
/// The error pointer must be valid if non-null.
#[inline]
pub unsafe fn init_error(out_error: *mut RegiocastError) {
    if !out_error.is_null() {
        *out_error = RegiocastError::success();
    }
}

/// # Safety
/// The error pointer must be valid if non-null.
#[inline]
pub unsafe fn set_error(out_error: *mut RegiocastError, code: ErrorCode, message: &str) {
    if !out_error.is_null() {
        (*out_error).set_error(code, message);
    }
}

/// Report a core error with its mapped code.
///
/// # Safety
/// The error pointer must be valid if non-null.
pub unsafe fn set_forecast_error(out_error: *mut RegiocastError, error: &ForecastError) {
    tracing::debug!(kind = error.kind(), error = %error, "call failed at the C boundary");
    set_error(out_error, ErrorCode::from(error), &error.to_string());
}

/// Report the first NULL argument by name. Returns true if one was found.
///
/// # Safety
/// The error pointer must be valid if non-null.
pub unsafe fn report_null_argument(
    out_error: *mut RegiocastError,
    args: &[(&str, *const c_void)],
) -> bool {
    match args.iter().find(|(_, ptr)| ptr.is_null()) {
        Some((name, _)) => {
            set_error(
                out_error,
                ErrorCode::NullPointer,
                &format!("{} must not be NULL", name),
            );
            true
        }
        None => false,
    }
}

/// Report a caught panic.
///
/// # Safety
/// The error pointer must be valid if non-null.
pub unsafe fn set_panic_error(out_error: *mut RegiocastError) {
    tracing::error!("panic caught at the C boundary");
    set_error(out_error, ErrorCode::PanicCaught, "Panic in Rust code");
}

/// Body of every fallible exported function.
///
/// Resets `out_error`, rejects NULL arguments, runs the block (which
/// evaluates to `Result<bool, ForecastError>`) and turns errors and panics
/// into an error code and a `false` return.
///
/// ```ignore
/// ffi_execute!(out_error, [frame, out_json], {
///     Ok::<bool, ForecastError>(true)
/// })
/// ```
#[macro_export]
macro_rules! ffi_execute {
    ($out_error:expr, [$($ptr:ident),+ $(,)?], $body:block) => {{
        use $crate::error_handling::{
            init_error, report_null_argument, set_forecast_error, set_panic_error,
        };
        use std::panic::{catch_unwind, AssertUnwindSafe};

        unsafe {
            init_error($out_error);

            let args: &[(&str, *const core::ffi::c_void)] = &[
                $((stringify!($ptr), $ptr as *const core::ffi::c_void)),+
            ];
            if report_null_argument($out_error, args) {
                return false;
            }

            match catch_unwind(AssertUnwindSafe(|| $body)) {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    set_forecast_error($out_error, &e);
                    return false;
                }
                Err(_) => {
                    set_panic_error($out_error);
                    return false;
                }
            }
        }
    }};
}
