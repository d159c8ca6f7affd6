//! # Balance Store
//!
//! Reads and adjusts a user's running totals.
//!
//! ## Two Numbers, Two Questions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  total_points        "what does the ledger say the user holds?"        │
//! │  ─────────────        signed running total, = Σ history.points         │
//! │                                                                         │
//! │  available_points    "what may the user redeem right now?"             │
//! │  ────────────────     Σ earn entries dated within the last 12 months   │
//! │                                                                         │
//! │  They differ: old earns fall out of the availability window before    │
//! │  (or without) being expired, and redemptions lower total_points but    │
//! │  never available_points.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::debug;

use reward_core::{ExpirationWindow, PointsBalance, UserId};
use reward_db::{Database, DbResult, SqliteConnection};

use crate::error::{LedgerError, LedgerResult};

/// Balance reads and the adjust primitive every writer shares.
#[derive(Debug, Clone)]
pub struct BalanceStore {
    db: Database,
}

impl BalanceStore {
    pub fn new(db: Database) -> Self {
        BalanceStore { db }
    }

    /// Returns the user's balance.
    ///
    /// ## Errors
    /// `BalanceNotFound` when the user has never earned points. Callers
    /// that treat absence as zero use [`get_balance_or_zero`](Self::get_balance_or_zero).
    pub async fn get_balance(&self, user_id: UserId) -> LedgerResult<PointsBalance> {
        self.db
            .balances()
            .get(user_id)
            .await?
            .ok_or(LedgerError::BalanceNotFound(user_id))
    }

    /// Returns the user's balance, or zeros when there is no row.
    pub async fn get_balance_or_zero(&self, user_id: UserId) -> LedgerResult<PointsBalance> {
        Ok(self
            .db
            .balances()
            .get(user_id)
            .await?
            .unwrap_or_else(|| PointsBalance::empty(user_id)))
    }

    /// Applies `total_points += delta` and `points_redeemed += redeemed_delta`.
    ///
    /// Only callable inside a unit of work: the caller owns the SQL
    /// transaction and the user's lock. A missing row is created as if it
    /// had started at zero.
    ///
    /// ## Returns
    /// The new `total_points`.
    pub async fn adjust(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        delta: i64,
        redeemed_delta: i64,
    ) -> DbResult<i64> {
        Ok(self
            .adjust_balance(conn, user_id, delta, redeemed_delta)
            .await?
            .total_points)
    }

    /// Like [`adjust`](Self::adjust) but returns both totals.
    pub(crate) async fn adjust_balance(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        delta: i64,
        redeemed_delta: i64,
    ) -> DbResult<PointsBalance> {
        let balance = self
            .db
            .balances()
            .adjust(conn, user_id, delta, redeemed_delta)
            .await?;

        debug!(
            user_id,
            delta,
            redeemed_delta,
            total_points = balance.total_points,
            "Balance adjusted"
        );
        Ok(balance)
    }

    /// Makes sure the user has a row and takes the write lock for the rest
    /// of the unit of work.
    pub(crate) async fn lock_row(&self, conn: &mut SqliteConnection, user_id: UserId) -> DbResult<()> {
        self.db.balances().ensure(conn, user_id).await
    }

    /// Reads the balance on the unit of work's connection.
    pub(crate) async fn get_in(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> DbResult<PointsBalance> {
        Ok(self
            .db
            .balances()
            .get_with(&mut *conn, user_id)
            .await?
            .unwrap_or_else(|| PointsBalance::empty(user_id)))
    }

    /// Points earned within the trailing 12 months.
    pub async fn available_points(&self, user_id: UserId) -> LedgerResult<i64> {
        let since = availability_cutoff(Utc::now())?;
        Ok(self
            .db
            .history()
            .sum_earned_since(self.db.pool(), user_id, since)
            .await?)
    }

    /// [`available_points`](Self::available_points) evaluated at `now` on
    /// the unit of work's connection.
    pub(crate) async fn available_points_in(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> LedgerResult<i64> {
        let since = availability_cutoff(now)?;
        Ok(self
            .db
            .history()
            .sum_earned_since(&mut *conn, user_id, since)
            .await?)
    }
}

fn availability_cutoff(now: DateTime<Utc>) -> LedgerResult<DateTime<Utc>> {
    Ok(ExpirationWindow::availability().cutoff(now)?)
}
