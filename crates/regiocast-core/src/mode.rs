//! Forecast mode names and their aliases.

use crate::error::{ForecastError, Result};

/// Temporal strategy used for a forecast request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForecastMode {
    /// One fit, projected a fixed number of steps past the data.
    Longterm,
    /// Walk-forward backtest with one next-step prediction per cutoff.
    Rolling,
}

impl std::str::FromStr for ForecastMode {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standalone" | "longterm" => Ok(ForecastMode::Longterm),
            "interleaved" | "rolling" | "short" => Ok(ForecastMode::Rolling),
            _ => Err(ForecastError::InvalidMode(s.to_string())),
        }
    }
}

impl ForecastMode {
    /// Canonical tag attached to results.
    pub fn name(&self) -> &'static str {
        match self {
            ForecastMode::Longterm => "longterm",
            ForecastMode::Rolling => "rolling",
        }
    }
}

impl std::fmt::Display for ForecastMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve a free-form mode string.
pub fn resolve_mode(name: &str) -> Result<ForecastMode> {
    name.parse()
}
