//! C-compatible type definitions for FFI boundary.

use libc::{c_char, c_int};
use regiocast_core::{CleanedFrame, ForecastError};

/// Error codes for FFI boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = 1,
    InvalidInput = 2,
    UnreadableFile = 3,
    MissingColumn = 4,
    InvalidMode = 5,
    ModelFit = 6,
    InsufficientData = 7,
    InvalidParameter = 8,
    Cancelled = 9,
    DeadlineExceeded = 10,
    BudgetExhausted = 11,
    AllocationError = 12,
    SerializationError = 13,
    PanicCaught = 14,
}

impl From<&ForecastError> for ErrorCode {
    fn from(e: &ForecastError) -> Self {
        match e {
            ForecastError::UnreadableFile(_) => ErrorCode::UnreadableFile,
            ForecastError::MissingColumn { .. } => ErrorCode::MissingColumn,
            ForecastError::InvalidMode(_) => ErrorCode::InvalidMode,
            ForecastError::ModelFit(_) => ErrorCode::ModelFit,
            ForecastError::InsufficientHistory { .. } | ForecastError::InsufficientData { .. } => {
                ErrorCode::InsufficientData
            }
            ForecastError::InvalidInput(_) => ErrorCode::InvalidInput,
            ForecastError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            ForecastError::Cancelled => ErrorCode::Cancelled,
            ForecastError::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,
            ForecastError::BudgetExhausted(_) => ErrorCode::BudgetExhausted,
        }
    }
}

/// Error structure with message buffer for FFI.
#[repr(C)]
pub struct RegiocastError {
    pub code: ErrorCode,
    pub message: [c_char; 256],
}

impl RegiocastError {
    /// Create a success error (no error).
    pub fn success() -> Self {
        Self {
            code: ErrorCode::Success,
            message: [0; 256],
        }
    }

    /// Set an error with code and message.
    pub fn set_error(&mut self, code: ErrorCode, msg: &str) {
        self.code = code;
        let bytes = msg.as_bytes();
        let len = bytes.len().min(255);
        for (i, &b) in bytes[..len].iter().enumerate() {
            self.message[i] = b as c_char;
        }
        self.message[len] = 0; // Null terminator
    }

    /// Message as a Rust string (up to the first NUL).
    pub fn message_str(&self) -> String {
        let bytes: Vec<u8> = self
            .message
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for RegiocastError {
    fn default() -> Self {
        Self::success()
    }
}

/// Encoding hint values accepted by `regiocast_clean`.
pub const REGIOCAST_HINT_CSV: c_int = 0;
pub const REGIOCAST_HINT_EXCEL: c_int = 1;
/// Sniff the workbook signature, else CSV.
pub const REGIOCAST_HINT_AUTO: c_int = 2;

/// Opaque handle to a cleaned frame owned by Rust.
pub struct RegiocastFrame {
    pub(crate) frame: CleanedFrame,
}

impl RegiocastFrame {
    pub fn frame(&self) -> &CleanedFrame {
        &self.frame
    }
}

/// Options for forecasting.
///
/// Column names are borrowed null-terminated strings; the short enum-like
/// settings are fixed buffers.
#[repr(C)]
pub struct ForecastOptions {
    /// Numeric column to forecast (required)
    pub target_column: *const c_char,
    /// Region column (NULL = "county")
    pub region_column: *const c_char,
    /// Date column (NULL = detect)
    pub date_column: *const c_char,
    /// Mode name: longterm/standalone or rolling/interleaved/short
    pub mode: [c_char; 32],
    /// Backend name: statistical/prophet or neural/neuralprophet
    pub backend: [c_char; 32],
    /// Step granularity: auto, daily, weekly, monthly, quarterly or yearly.
    /// Empty or "auto" detects the spacing of each region's history.
    pub granularity: [c_char; 16],
    /// Duplicate timestamp policy: first, mean or error
    pub duplicates: [c_char; 16],
    /// Longterm extension length (<= 0 = default)
    pub periods: c_int,
    /// Rolling minimum training points (<= 0 = default)
    pub min_history: c_int,
    /// Request deadline in milliseconds (<= 0 = the core default of 300 s)
    pub deadline_ms: c_int,
    /// Maximum number of model fits (<= 0 = unlimited)
    pub max_fits: c_int,
}

pub(crate) fn fill_buffer<const N: usize>(value: &str) -> [c_char; N] {
    let mut buf = [0 as c_char; N];
    value
        .bytes()
        .take(N - 1)
        .enumerate()
        .for_each(|(i, b)| buf[i] = b as c_char);
    buf
}

impl ForecastOptions {
    /// Replace the mode buffer.
    pub fn set_mode(&mut self, mode: &str) {
        self.mode = fill_buffer(mode);
    }

    /// Replace the backend buffer.
    pub fn set_backend(&mut self, backend: &str) {
        self.backend = fill_buffer(backend);
    }
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            target_column: std::ptr::null(),
            region_column: std::ptr::null(),
            date_column: std::ptr::null(),
            mode: fill_buffer("longterm"),
            backend: fill_buffer("statistical"),
            granularity: fill_buffer("auto"),
            duplicates: fill_buffer("first"),
            periods: 30,
            min_history: 6,
            deadline_ms: 0,
            max_fits: 0,
        }
    }
}
