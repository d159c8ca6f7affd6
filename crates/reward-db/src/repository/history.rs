//! # Points History Repository
//!
//! Append-only log of every point movement.
//!
//! ## Reading the Log
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  query(HistoryQuery)                                                    │
//! │                                                                         │
//! │  WHERE user_id = ?                                                      │
//! │    [AND date >= date_from]                                              │
//! │    [AND date <= date_to]                                                │
//! │    [AND kind  =  kind]                                                  │
//! │  ORDER BY date DESC, id DESC          ← stable for equal timestamps     │
//! │  LIMIT size OFFSET (number - 1) * size                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are never updated or deleted.

use chrono::{DateTime, Utc};
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use reward_core::{HistoryQuery, PointsHistoryEntry, PointsKind, UserId};

/// A history row to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub user_id: UserId,
    /// Signed delta.
    pub points: i64,
    pub kind: PointsKind,
    pub reason: String,
    pub date: DateTime<Utc>,
    pub transaction_id: Option<String>,
}

/// Repository for points history operations.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    /// Creates a new HistoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        HistoryRepository { pool }
    }

    /// Appends an entry inside the caller's unit of work.
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        entry: &NewHistoryEntry,
    ) -> DbResult<PointsHistoryEntry> {
        debug!(
            user_id = entry.user_id,
            points = entry.points,
            kind = %entry.kind,
            "Appending history entry"
        );

        let stored = sqlx::query_as::<_, PointsHistoryEntry>(
            r#"
            INSERT INTO points_history (user_id, points, kind, reason, date, transaction_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, user_id, points, kind, reason, date, transaction_id
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.points)
        .bind(entry.kind)
        .bind(&entry.reason)
        .bind(entry.date)
        .bind(&entry.transaction_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(stored)
    }

    /// Returns one page of a user's history, newest first.
    pub async fn query(&self, query: &HistoryQuery) -> DbResult<Vec<PointsHistoryEntry>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, user_id, points, kind, reason, date, transaction_id \
             FROM points_history WHERE user_id = ",
        );
        builder.push_bind(query.user_id);
        push_filters(&mut builder, query);

        builder
            .push(" ORDER BY date DESC, id DESC LIMIT ")
            .push_bind(query.page.size)
            .push(" OFFSET ")
            .push_bind(query.page.offset());

        let entries = builder
            .build_query_as::<PointsHistoryEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Counts entries matching the query's filters, ignoring the page.
    pub async fn count(&self, query: &HistoryQuery) -> DbResult<i64> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM points_history WHERE user_id = ");
        builder.push_bind(query.user_id);
        push_filters(&mut builder, query);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Sums `earn` entries dated on or after `since`.
    ///
    /// This is the redeemable-points figure before it is capped by the
    /// balance.
    pub async fn sum_earned_since<'e, E>(
        &self,
        executor: E,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> DbResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(points), 0) FROM points_history
            WHERE user_id = ?1 AND kind = ?2 AND date >= ?3
            "#,
        )
        .bind(user_id)
        .bind(PointsKind::Earn)
        .bind(since)
        .fetch_one(executor)
        .await?;

        Ok(sum)
    }

    /// Sums every entry for a user. Equals the balance's `total_points`
    /// when the ledger is consistent.
    pub async fn sum_all(&self, user_id: UserId) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0) FROM points_history WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Sums a user's entries of one kind.
    pub async fn sum_by_kind(&self, user_id: UserId, kind: PointsKind) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0) FROM points_history WHERE user_id = ?1 AND kind = ?2",
        )
        .bind(user_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &HistoryQuery) {
    if let Some(from) = query.date_from {
        builder.push(" AND date >= ").push_bind(from);
    }
    if let Some(to) = query.date_to {
        builder.push(" AND date <= ").push_bind(to);
    }
    if let Some(kind) = query.kind {
        builder.push(" AND kind = ").push_bind(kind);
    }
}
