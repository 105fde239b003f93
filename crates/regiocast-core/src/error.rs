//! Error types for table cleaning and forecasting.

use thiserror::Error;

/// Result type for regiocast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Error types for regiocast operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Unreadable file: {0}")]
    UnreadableFile(String),

    #[error("Missing column '{column}'. Available: [{available}]")]
    MissingColumn { column: String, available: String },

    #[error("Unsupported forecast mode: {0}")]
    InvalidMode(String),

    #[error("Insufficient history: need at least {needed} points before the cutoff, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("Model fit error: {0}")]
    ModelFit(String),

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Forecast request was cancelled")]
    Cancelled,

    #[error("Forecast deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),

    #[error("Model fit budget of {0} fits exhausted")]
    BudgetExhausted(usize),
}

impl ForecastError {
    /// Build a `MissingColumn` error listing the columns that do exist.
    pub fn missing_column<S: AsRef<str>>(column: &str, available: &[S]) -> Self {
        ForecastError::MissingColumn {
            column: column.to_string(),
            available: available
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Convert to an error code for FFI.
    pub fn to_code(&self) -> i32 {
        match self {
            ForecastError::UnreadableFile(_) => 1,
            ForecastError::MissingColumn { .. } => 2,
            ForecastError::InvalidMode(_) => 3,
            ForecastError::InsufficientHistory { .. } => 4,
            ForecastError::ModelFit(_) => 5,
            ForecastError::InsufficientData { .. } => 6,
            ForecastError::InvalidInput(_) => 7,
            ForecastError::InvalidParameter { .. } => 8,
            ForecastError::Cancelled => 9,
            ForecastError::DeadlineExceeded(_) => 10,
            ForecastError::BudgetExhausted(_) => 11,
        }
    }

    /// Stable kind name, reported next to the message to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::UnreadableFile(_) => "unreadable_file",
            ForecastError::MissingColumn { .. } => "missing_column",
            ForecastError::InvalidMode(_) => "invalid_mode",
            ForecastError::InsufficientHistory { .. } => "insufficient_history",
            ForecastError::ModelFit(_) => "model_fit",
            ForecastError::InsufficientData { .. } => "insufficient_data",
            ForecastError::InvalidInput(_) => "invalid_input",
            ForecastError::InvalidParameter { .. } => "invalid_parameter",
            ForecastError::Cancelled => "cancelled",
            ForecastError::DeadlineExceeded(_) => "deadline_exceeded",
            ForecastError::BudgetExhausted(_) => "budget_exhausted",
        }
    }

    /// Whether the error aborts only one unit of work (a rolling step or a
    /// region fit) rather than the whole request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::ModelFit(_)
                | ForecastError::InsufficientData { .. }
                | ForecastError::InsufficientHistory { .. }
        )
    }
}

impl From<csv::Error> for ForecastError {
    fn from(e: csv::Error) -> Self {
        ForecastError::UnreadableFile(format!("CSV: {}", e))
    }
}

impl From<calamine::Error> for ForecastError {
    fn from(e: calamine::Error) -> Self {
        ForecastError::UnreadableFile(format!("Excel: {}", e))
    }
}
