//! # Expiration Windows
//!
//! Calendar-aware age limits expressed as years, months and days.
//!
//! ```text
//!   now = 2026-03-31, window = (0y, 1m, 0d)
//!   cutoff = 2026-02-28   (month subtraction clamps to the last valid day)
//!
//!   transaction_date <= cutoff  →  eligible for expiration
//! ```

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::AVAILABILITY_WINDOW_MONTHS;

/// An age expressed as `(years, months, days)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExpirationWindow {
    #[serde(default)]
    pub years: u32,
    #[serde(default)]
    pub months: u32,
    #[serde(default)]
    pub days: u32,
}

impl ExpirationWindow {
    pub const fn new(years: u32, months: u32, days: u32) -> Self {
        ExpirationWindow {
            years,
            months,
            days,
        }
    }

    /// Exactly one calendar year.
    pub const fn one_year() -> Self {
        Self::new(1, 0, 0)
    }

    /// The trailing window whose earn entries are redeemable.
    pub const fn availability() -> Self {
        Self::new(0, AVAILABILITY_WINDOW_MONTHS, 0)
    }

    /// True when every component is zero.
    pub const fn is_empty(&self) -> bool {
        self.years == 0 && self.months == 0 && self.days == 0
    }

    /// Computes `now - window`.
    ///
    /// Years and months are subtracted together first, then days. Month
    /// subtraction clamps to the last day of the target month.
    ///
    /// ## Example
    /// ```rust
    /// use chrono::{TimeZone, Utc};
    /// use reward_core::ExpirationWindow;
    ///
    /// let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
    /// let cutoff = ExpirationWindow::one_year().cutoff(now).unwrap();
    /// assert_eq!(cutoff, Utc.with_ymd_and_hms(2025, 10, 16, 12, 0, 0).unwrap());
    /// ```
    pub fn cutoff(&self, now: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
        if self.is_empty() {
            return Err(CoreError::InvalidWindow(
                "at least one of years, months, days must be non-zero".to_string(),
            ));
        }

        let total_months = self
            .years
            .checked_mul(12)
            .and_then(|m| m.checked_add(self.months))
            .ok_or_else(|| CoreError::InvalidWindow("month count overflows".to_string()))?;

        now.checked_sub_months(Months::new(total_months))
            .and_then(|t| t.checked_sub_days(Days::new(u64::from(self.days))))
            .ok_or_else(|| CoreError::InvalidWindow(format!("{} before {} is out of range", self, now)))
    }
}

impl fmt::Display for ExpirationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}y{}m{}d", self.years, self.months, self.days)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_one_year_cutoff() {
        let cutoff = ExpirationWindow::one_year().cutoff(at(2026, 10, 16)).unwrap();
        assert_eq!(cutoff, at(2025, 10, 16));
    }

    #[test]
    fn test_mixed_window() {
        let window = ExpirationWindow::new(1, 2, 10);
        assert_eq!(window.cutoff(at(2026, 10, 16)).unwrap(), at(2025, 8, 6));
    }

    #[test]
    fn test_month_end_clamps() {
        let window = ExpirationWindow::new(0, 1, 0);
        assert_eq!(window.cutoff(at(2026, 3, 31)).unwrap(), at(2026, 2, 28));
    }

    #[test]
    fn test_leap_day_minus_year() {
        let cutoff = ExpirationWindow::one_year().cutoff(at(2028, 2, 29)).unwrap();
        assert_eq!(cutoff, at(2027, 2, 28));
    }

    #[test]
    fn test_days_only() {
        let window = ExpirationWindow::new(0, 0, 45);
        assert_eq!(window.cutoff(at(2026, 3, 1)).unwrap(), at(2026, 1, 15));
    }

    #[test]
    fn test_empty_window_is_rejected() {
        let err = ExpirationWindow::default().cutoff(at(2026, 1, 1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidWindow(_)));
    }

    #[test]
    fn test_availability_window_is_twelve_months() {
        let now = at(2026, 10, 16);
        assert_eq!(
            ExpirationWindow::availability().cutoff(now).unwrap(),
            ExpirationWindow::one_year().cutoff(now).unwrap()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ExpirationWindow::new(1, 6, 3).to_string(), "1y6m3d");
    }
}
