//! Tunable limits for the verification sweep.

use std::time::Duration;

/// How often the verification sweep is enqueued.
pub const DEFAULT_VERIFICATION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How old a pending transmutation or open mission must be before it is reported.
pub const DEFAULT_PENDING_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Stock level at or below which a material is reported as scarce.
pub const DEFAULT_LOW_STOCK: f64 = 5.0;

/// Limits consulted by the scheduler and the verification handler.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use crucible::background::Thresholds;
///
/// let mut thresholds = Thresholds::default();
/// thresholds.apply(Some(Duration::ZERO), None, Some(10.0));
///
/// assert_eq!(thresholds.verification_interval, Duration::from_secs(86_400));
/// assert_eq!(thresholds.low_stock, 10.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub verification_interval: Duration,
    pub pending_age: Duration,
    pub low_stock: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            verification_interval: DEFAULT_VERIFICATION_INTERVAL,
            pending_age: DEFAULT_PENDING_AGE,
            low_stock: DEFAULT_LOW_STOCK,
        }
    }
}

impl Thresholds {
    /// Overrides each limit independently. Absent, zero, negative and NaN
    /// values leave the current setting untouched.
    pub fn apply(
        &mut self,
        verification_interval: Option<Duration>,
        pending_age: Option<Duration>,
        low_stock: Option<f64>,
    ) {
        if let Some(interval) = verification_interval.filter(|d| !d.is_zero()) {
            self.verification_interval = interval;
        }
        if let Some(age) = pending_age.filter(|d| !d.is_zero()) {
            self.pending_age = age;
        }
        if let Some(floor) = low_stock.filter(|v| *v > 0.0) {
            self.low_stock = floor;
        }
    }
}
