//! # Domain Types
//!
//! Core domain types used throughout the reward ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │  Transaction    │   │  PointsBalance  │   │ PointsHistoryEntry  │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id (row)       │   │  user_id        │   │  user_id            │   │
//! │  │  transaction_id │   │  total_points   │   │  points (signed)    │   │
//! │  │  amount_cents   │   │  points_redeemed│   │  kind               │   │
//! │  │  points_earned  │   └─────────────────┘   │  reason, date       │   │
//! │  │  expired_at     │                         └─────────────────────┘   │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  Invariant: total_points == Σ history.points for the same user          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! A recorded transaction has:
//! - `id`: storage row id assigned by the database
//! - `transaction_id`: UUID v4 idempotency key generated by the recorder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;
use crate::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Storage identifier of a user.
pub type UserId = i64;

// =============================================================================
// User
// =============================================================================

/// A ledger participant. Credentials live with the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_on: DateTime<Utc>,
}

// =============================================================================
// Transactions
// =============================================================================

/// A spend event as handed over by the request layer, before recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// User the spend belongs to.
    pub user_id: UserId,

    /// Amount spent. Must be positive.
    pub amount: Money,

    /// Free-text spend category used for the multiplier lookup.
    pub category: String,

    /// Product code of the purchased item.
    pub product_code: String,

    /// When the spend happened. Defaults to the recording time.
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
}

impl NewTransaction {
    /// Creates a transaction dated "now" at recording time.
    pub fn new(
        user_id: UserId,
        amount: Money,
        category: impl Into<String>,
        product_code: impl Into<String>,
    ) -> Self {
        NewTransaction {
            user_id,
            amount,
            category: category.into(),
            product_code: product_code.into(),
            transaction_date: None,
        }
    }

    /// Sets an explicit transaction date.
    pub fn dated(mut self, date: DateTime<Utc>) -> Self {
        self.transaction_date = Some(date);
        self
    }
}

/// A recorded spend transaction.
///
/// Immutable once written, apart from `expired_at` which the expiration
/// scheduler sets exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Transaction {
    /// Storage row id.
    pub id: i64,

    /// Generated idempotency key (UUID v4).
    pub transaction_id: String,

    pub user_id: UserId,

    /// Amount in cents.
    pub amount_cents: i64,

    pub category: String,

    pub transaction_date: DateTime<Utc>,

    pub product_code: String,

    /// `floor(amount) * multiplier(category)` at recording time.
    pub points_earned: i64,

    pub created_on: DateTime<Utc>,

    /// Set when the earned points have been expired.
    pub expired_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Returns the amount as a Money value.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// True once the scheduler has expired this transaction's points.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expired_at.is_some()
    }
}

// =============================================================================
// Balance
// =============================================================================

/// Denormalized running totals for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PointsBalance {
    pub user_id: UserId,

    /// Signed running total of all point movements.
    pub total_points: i64,

    /// Lifetime redemptions. Never decreases.
    pub points_redeemed: i64,
}

impl PointsBalance {
    /// A zero balance, equivalent to a user with no balance row.
    pub const fn empty(user_id: UserId) -> Self {
        PointsBalance {
            user_id,
            total_points: 0,
            points_redeemed: 0,
        }
    }
}

// =============================================================================
// Points History
// =============================================================================

/// The kind of point movement recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PointsKind {
    /// Points credited by a recorded transaction.
    Earn,
    /// Points spent by the user.
    Redeem,
    /// Points removed by the expiration scheduler.
    Expired,
}

impl PointsKind {
    /// Returns the stored string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PointsKind::Earn => "earn",
            PointsKind::Redeem => "redeem",
            PointsKind::Expired => "expired",
        }
    }
}

impl fmt::Display for PointsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointsKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earn" => Ok(PointsKind::Earn),
            "redeem" => Ok(PointsKind::Redeem),
            "expired" | "expire" => Ok(PointsKind::Expired),
            other => Err(ValidationError::InvalidFormat {
                field: "kind".to_string(),
                reason: format!("unknown points kind '{}'", other),
            }),
        }
    }
}

/// An append-only record of one point movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PointsHistoryEntry {
    pub id: i64,

    pub user_id: UserId,

    /// Signed delta: positive for earn, negative for redeem/expired.
    pub points: i64,

    pub kind: PointsKind,

    pub reason: String,

    pub date: DateTime<Utc>,

    /// Idempotency key of the transaction behind an earn/expired entry.
    pub transaction_id: Option<String>,
}

// =============================================================================
// History Query
// =============================================================================

/// A normalised page request: 1-based page number and a bounded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl Page {
    /// Normalises raw page inputs.
    ///
    /// ## Rules
    /// - `number <= 0` becomes 1
    /// - `size <= 0` becomes [`DEFAULT_PAGE_SIZE`]
    /// - `size > MAX_PAGE_SIZE` is clamped to [`MAX_PAGE_SIZE`]
    ///
    /// ## Example
    /// ```rust
    /// use reward_core::types::Page;
    ///
    /// assert_eq!(Page::normalize(0, 0), Page { number: 1, size: 10 });
    /// assert_eq!(Page::normalize(3, 500), Page { number: 3, size: 100 });
    /// ```
    pub fn normalize(number: i64, size: i64) -> Self {
        let number = if number <= 0 { 1 } else { number };
        let size = if size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            size.min(MAX_PAGE_SIZE)
        };
        Page { number, size }
    }

    /// Row offset of the first entry on this page.
    pub fn offset(&self) -> i64 {
        (self.number - 1).saturating_mul(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::normalize(1, DEFAULT_PAGE_SIZE)
    }
}

/// Filters for a points history read. All filters combine with AND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub user_id: UserId,
    pub page: Page,
    /// Inclusive lower bound on the entry date.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the entry date.
    pub date_to: Option<DateTime<Utc>>,
    pub kind: Option<PointsKind>,
}

impl HistoryQuery {
    /// First page of a user's full history.
    pub fn new(user_id: UserId) -> Self {
        HistoryQuery {
            user_id,
            page: Page::default(),
            date_from: None,
            date_to: None,
            kind: None,
        }
    }

    /// Sets the page from raw, possibly out-of-range inputs.
    pub fn page(mut self, number: i64, size: i64) -> Self {
        self.page = Page::normalize(number, size);
        self
    }

    pub fn date_from(mut self, from: DateTime<Utc>) -> Self {
        self.date_from = Some(from);
        self
    }

    pub fn date_to(mut self, to: DateTime<Utc>) -> Self {
        self.date_to = Some(to);
        self
    }

    pub fn kind(mut self, kind: PointsKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_normalization() {
        assert_eq!(Page::normalize(0, 0), Page { number: 1, size: 10 });
        assert_eq!(Page::normalize(-4, -1), Page { number: 1, size: 10 });
        assert_eq!(Page::normalize(2, 25), Page { number: 2, size: 25 });
        assert_eq!(Page::normalize(1, 101), Page { number: 1, size: 100 });
        assert_eq!(Page::normalize(1, 100), Page { number: 1, size: 100 });
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::normalize(1, 10).offset(), 0);
        assert_eq!(Page::normalize(3, 20).offset(), 40);
    }

    #[test]
    fn test_points_kind_round_trip_strings() {
        for kind in [PointsKind::Earn, PointsKind::Redeem, PointsKind::Expired] {
            assert_eq!(kind.as_str().parse::<PointsKind>().unwrap(), kind);
        }
        assert_eq!("expire".parse::<PointsKind>().unwrap(), PointsKind::Expired);
        assert!("refund".parse::<PointsKind>().is_err());
    }

    #[test]
    fn test_points_kind_serde_is_lowercase() {
        let json = serde_json::to_string(&PointsKind::Expired).unwrap();
        assert_eq!(json, "\"expired\"");
    }

    #[test]
    fn test_history_query_builder() {
        let q = HistoryQuery::new(7).page(0, 1000).kind(PointsKind::Redeem);
        assert_eq!(q.user_id, 7);
        assert_eq!(q.page, Page { number: 1, size: 100 });
        assert_eq!(q.kind, Some(PointsKind::Redeem));
        assert!(q.date_from.is_none());
    }

    #[test]
    fn test_empty_balance() {
        let b = PointsBalance::empty(3);
        assert_eq!(b.total_points, 0);
        assert_eq!(b.points_redeemed, 0);
    }
}
