//! Fixed-window limit configuration.
//!
//! A [`Limits`] value describes one window: how long it lasts and how many
//! events a single key may register inside it before the next one is
//! reported as exceeding the limit.

use std::time::Duration;
use thiserror::Error;

/// Error returned when a limit configuration is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimitsError {
    /// Window period must be greater than zero
    #[error("invalid rate limits: period must be greater than 0")]
    ZeroPeriod,
    /// Per-window limit must be greater than zero
    #[error("invalid rate limits: limit must be greater than 0")]
    ZeroLimit,
}

/// Window length and per-window event budget for one bucket.
///
/// # Example
/// ```
/// use brute_guard::Limits;
/// use std::time::Duration;
///
/// let limits = Limits::new(Duration::from_secs(60), 10).unwrap();
/// assert!(!limits.exceeded_by(10));
/// assert!(limits.exceeded_by(11));
///
/// assert!(Limits::new(Duration::ZERO, 10).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Length of one fixed window
    pub period: Duration,
    /// Events admitted per window
    pub limit: u64,
}

impl Limits {
    /// Create validated limits.
    ///
    /// # Errors
    /// Returns `LimitsError::ZeroPeriod` if `period` is zero and
    /// `LimitsError::ZeroLimit` if `limit` is zero.
    pub fn new(period: Duration, limit: u64) -> Result<Self, LimitsError> {
        let limits = Self { period, limit };
        limits.validate()?;
        Ok(limits)
    }

    /// Check that both the period and the limit are strictly positive.
    ///
    /// The fields are public, so values built with a struct literal are
    /// validated again by the registry before use.
    pub fn validate(&self) -> Result<(), LimitsError> {
        if self.period.is_zero() {
            return Err(LimitsError::ZeroPeriod);
        }
        if self.limit == 0 {
            return Err(LimitsError::ZeroLimit);
        }
        Ok(())
    }

    /// Whether a window count of `count` is past the limit.
    ///
    /// The event that exactly meets the limit is still admitted.
    pub fn exceeded_by(&self, count: u64) -> bool {
        count > self.limit
    }

    /// Inactivity after which a bucket with these limits is reclaimed.
    pub fn idle_timeout(&self) -> Duration {
        self.period.saturating_mul(2)
    }
}
