//! # Balance Repository
//!
//! One row per user holding the denormalized running totals.
//!
//! ## Upsert Semantics
//! ```text
//! adjust(user, delta, redeemed_delta)
//!
//!   no row   ──► INSERT (user, delta, redeemed_delta)
//!   row      ──► total_points    += delta
//!                points_redeemed += redeemed_delta
//!
//! Both cases are a single statement, so two callers can never both
//! "create" the row and lose one increment.
//! ```
//!
//! Absence of a row is equivalent to a zero balance.

use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use reward_core::{PointsBalance, UserId};

/// Repository for balance operations.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    pool: SqlitePool,
}

impl BalanceRepository {
    /// Creates a new BalanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BalanceRepository { pool }
    }

    /// Reads the balance row, if any.
    pub async fn get(&self, user_id: UserId) -> DbResult<Option<PointsBalance>> {
        self.get_with(&self.pool, user_id).await
    }

    /// Reads the balance row on a specific executor.
    pub async fn get_with<'e, E>(&self, executor: E, user_id: UserId) -> DbResult<Option<PointsBalance>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let balance = sqlx::query_as::<_, PointsBalance>(
            "SELECT user_id, total_points, points_redeemed FROM points_balance WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        Ok(balance)
    }

    /// Creates a zero row if the user has none.
    ///
    /// Being a write, this also takes SQLite's write lock for the rest of
    /// the enclosing transaction, so the reads that follow it see a state
    /// no other writer can change before commit.
    pub async fn ensure(&self, conn: &mut SqliteConnection, user_id: UserId) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO points_balance (user_id, total_points, points_redeemed)
            VALUES (?1, 0, 0)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Applies `delta` to `total_points` and `redeemed_delta` to
    /// `points_redeemed`, creating the row if needed.
    ///
    /// ## Returns
    /// The balance after the adjustment.
    pub async fn adjust(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        delta: i64,
        redeemed_delta: i64,
    ) -> DbResult<PointsBalance> {
        debug!(user_id, delta, redeemed_delta, "Adjusting balance");

        let balance = sqlx::query_as::<_, PointsBalance>(
            r#"
            INSERT INTO points_balance (user_id, total_points, points_redeemed)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                total_points    = total_points + excluded.total_points,
                points_redeemed = points_redeemed + excluded.points_redeemed
            RETURNING user_id, total_points, points_redeemed
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .bind(redeemed_delta)
        .fetch_one(&mut *conn)
        .await?;

        Ok(balance)
    }

    /// Lists every balance row ordered by user.
    pub async fn list(&self) -> DbResult<Vec<PointsBalance>> {
        let balances = sqlx::query_as::<_, PointsBalance>(
            "SELECT user_id, total_points, points_redeemed FROM points_balance ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(balances)
    }
}
