//! # Multiplier Table
//!
//! Immutable mapping from spend category to an integer point multiplier.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  multipliers.json          MultiplierTable                   │
//! │  {                                                           │
//! │    "grocery": 2,      ──►  grocery     → 2                   │
//! │    "electronics": 3        electronics → 3                   │
//! │  }                         <anything>  → 1 (default)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The table is built once at startup and shared by reference; lookups
//! never mutate it. Category matching is exact and case-sensitive.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::DEFAULT_MULTIPLIER;

/// Category → multiplier lookup with a default of 1 for unknown categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiplierTable {
    entries: HashMap<String, i64>,
}

impl MultiplierTable {
    /// An empty table: every category earns at the default multiplier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(category, multiplier)` pairs.
    ///
    /// Rejects any multiplier that is not a positive integer.
    pub fn from_entries<I, K>(entries: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        let mut map = HashMap::new();
        for (category, multiplier) in entries {
            let category = category.into();
            if multiplier <= 0 {
                return Err(CoreError::InvalidMultiplier {
                    category,
                    multiplier,
                });
            }
            map.insert(category, multiplier);
        }
        Ok(MultiplierTable { entries: map })
    }

    /// Parses a JSON object of the form `{"category": multiplier, ...}`.
    ///
    /// ## Example
    /// ```rust
    /// use reward_core::MultiplierTable;
    ///
    /// let table = MultiplierTable::from_json_str(r#"{"grocery": 2}"#).unwrap();
    /// assert_eq!(table.multiplier("grocery"), 2);
    /// assert_eq!(table.multiplier("toys"), 1);
    /// ```
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let raw: HashMap<String, i64> =
            serde_json::from_str(json).map_err(|e| CoreError::MultiplierParse(e.to_string()))?;
        Self::from_entries(raw)
    }

    /// Returns the multiplier for `category`, or 1 when it is not configured.
    pub fn multiplier(&self, category: &str) -> i64 {
        self.entries
            .get(category)
            .copied()
            .unwrap_or(DEFAULT_MULTIPLIER)
    }

    /// Points earned for a spend: `floor(amount) * multiplier(category)`.
    ///
    /// An amount whose points do not fit in an `i64` is rejected.
    pub fn points_for(&self, amount: Money, category: &str) -> Result<i64, ValidationError> {
        amount
            .whole_units()
            .checked_mul(self.multiplier(category))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "amount".to_string(),
                reason: format!("points for {} in '{}' overflow", amount, category),
            })
    }

    /// Number of configured categories.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates configured `(category, multiplier)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MultiplierTable {
        MultiplierTable::from_entries([("grocery", 2), ("electronics", 3)]).unwrap()
    }

    #[test]
    fn test_known_and_unknown_categories() {
        let table = sample();
        assert_eq!(table.multiplier("grocery"), 2);
        assert_eq!(table.multiplier("electronics"), 3);
        assert_eq!(table.multiplier("unknown"), 1);
        assert_eq!(table.multiplier(""), 1);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert_eq!(sample().multiplier("Grocery"), 1);
    }

    #[test]
    fn test_points_for_floors_amount() {
        let table = sample();
        assert_eq!(table.points_for(Money::from_cents(10_000), "grocery"), Ok(200));
        assert_eq!(table.points_for(Money::from_cents(10_099), "electronics"), Ok(300));
        assert_eq!(table.points_for(Money::from_cents(10_000), "unknown"), Ok(100));
        assert_eq!(table.points_for(Money::from_cents(99), "grocery"), Ok(0));
    }

    #[test]
    fn test_points_overflow_is_rejected() {
        let table = MultiplierTable::from_entries([("jackpot", 1_000)]).unwrap();
        let err = table.points_for(Money::from_cents(i64::MAX), "jackpot").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { ref field, .. } if field == "amount"));

        // Same amount at the default multiplier still fits.
        assert!(table.points_for(Money::from_cents(i64::MAX), "misc").is_ok());
    }

    #[test]
    fn test_rejects_non_positive_multiplier() {
        let err = MultiplierTable::from_entries([("broken", 0)]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMultiplier { multiplier: 0, .. }));
        assert!(MultiplierTable::from_entries([("broken", -2)]).is_err());
    }

    #[test]
    fn test_from_json() {
        let table =
            MultiplierTable::from_json_str(r#"{"grocery": 2, "electronics": 3}"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table, sample());

        assert!(MultiplierTable::from_json_str("[1, 2]").is_err());
        assert!(MultiplierTable::from_json_str(r#"{"grocery": 1.5}"#).is_err());
        assert!(MultiplierTable::from_json_str(r#"{"grocery": -1}"#).is_err());
    }

    #[test]
    fn test_empty_table_defaults_everything() {
        let table = MultiplierTable::new();
        assert!(table.is_empty());
        assert_eq!(table.multiplier("grocery"), 1);
    }
}
