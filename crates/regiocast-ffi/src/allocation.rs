//! Memory allocation utilities for FFI functions.
//!
//! Strings handed to C are allocated with `malloc` so callers can release
//! them with `regiocast_free_string` (or plain `free`).

use crate::types::{ErrorCode, RegiocastError};
use core::ffi::c_char;
use libc::{free, malloc};
use std::ptr;

/// Copy a Rust string into a newly allocated, null-terminated C string.
///
/// # Safety
/// Returns null on allocation failure. `s` must not contain interior NUL
/// bytes, or C readers will see a truncated string.
pub unsafe fn alloc_c_string(s: &str) -> *mut c_char {
    let ptr = malloc(s.len() + 1) as *mut c_char;
    if ptr.is_null() {
        return ptr;
    }
    ptr::copy_nonoverlapping(s.as_ptr() as *const c_char, ptr, s.len());
    *ptr.add(s.len()) = 0; // Null terminator
    ptr
}

/// Allocate and copy a string, setting error on failure.
///
/// # Safety
/// out_ptr must be a valid pointer; out_error must be valid if non-null.
/// Returns true on success, false on allocation failure.
pub unsafe fn alloc_and_copy_string(
    s: &str,
    out_ptr: *mut *mut c_char,
    out_error: *mut RegiocastError,
) -> bool {
    let ptr = alloc_c_string(s);
    if ptr.is_null() {
        if !out_error.is_null() {
            (*out_error).set_error(ErrorCode::AllocationError, "Memory allocation failed");
        }
        *out_ptr = ptr::null_mut();
        return false;
    }
    *out_ptr = ptr;
    true
}

/// Free a C pointer allocated by this module.
///
/// # Safety
/// ptr must be either null or a valid pointer allocated by malloc.
#[inline]
pub unsafe fn free_ptr(ptr: *mut core::ffi::c_void) {
    if !ptr.is_null() {
        free(ptr);
    }
}
