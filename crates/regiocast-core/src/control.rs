//! Per-request limits: cancellation, deadline and fit budget.
//!
//! [`RunControl`] only describes the limits and can be reused across
//! requests. Each request calls [`RunControl::start`] and checks the returned
//! [`RunTracker`], which owns the clock and the fit counter.

use crate::error::{ForecastError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deadline applied when the caller does not set one.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Cloneable cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits applied to every forecast request that uses them.
#[derive(Debug, Clone)]
pub struct RunControl {
    /// Wall-clock limit per request.
    pub deadline: Option<Duration>,
    /// Model fits allowed per request.
    pub max_fits: Option<usize>,
    pub cancel: CancelToken,
}

impl Default for RunControl {
    fn default() -> Self {
        Self {
            deadline: Some(DEFAULT_DEADLINE),
            max_fits: None,
            cancel: CancelToken::new(),
        }
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_fits(mut self, max_fits: usize) -> Self {
        self.max_fits = Some(max_fits);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Start the clock and an empty fit counter for one request.
    pub fn start(&self) -> RunTracker {
        RunTracker {
            limits: self.clone(),
            started: Instant::now(),
            fits: AtomicUsize::new(0),
        }
    }
}

/// Clock and fit counter of one running request.
#[derive(Debug)]
pub struct RunTracker {
    limits: RunControl,
    started: Instant,
    fits: AtomicUsize,
}

impl RunTracker {
    /// Fail if the request was cancelled or ran past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.limits.cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }
        if let Some(deadline) = self.limits.deadline {
            if self.started.elapsed() > deadline {
                return Err(ForecastError::DeadlineExceeded(deadline));
            }
        }
        Ok(())
    }

    /// Claim one model fit from the budget.
    pub fn check_fit(&self) -> Result<()> {
        self.check()?;
        let used = self.fits.fetch_add(1, Ordering::SeqCst);
        match self.limits.max_fits {
            Some(max) if used >= max => Err(ForecastError::BudgetExhausted(max)),
            _ => Ok(()),
        }
    }

    /// Fits claimed so far, including refused ones.
    pub fn fits_started(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }
}
