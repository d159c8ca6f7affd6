//! # Scheduler Lease Repository
//!
//! A named, time-bounded lease that keeps two scheduler processes from
//! expiring the same database at once.
//!
//! ```text
//!   try_acquire("expiration", holder=A, ttl)
//!
//!   no row                    ──► insert, A holds it         → true
//!   row held by A             ──► extend expires_at          → true
//!   row held by B, expired    ──► take over                  → true
//!   row held by B, live       ──► untouched                  → false
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// A lease row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Lease {
    pub name: String,
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

/// Repository for scheduler leases.
#[derive(Debug, Clone)]
pub struct LeaseRepository {
    pool: SqlitePool,
}

impl LeaseRepository {
    /// Creates a new LeaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LeaseRepository { pool }
    }

    /// Acquires or renews `name` for `holder` until `now + ttl`.
    pub async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_lease (name, holder, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                holder     = excluded.holder,
                expires_at = excluded.expires_at
            WHERE scheduler_lease.holder = excluded.holder
               OR scheduler_lease.expires_at <= ?4
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(now + ttl)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() == 1;
        debug!(lease = %name, holder = %holder, acquired, "Lease acquire attempt");
        Ok(acquired)
    }

    /// Releases `name` if `holder` still owns it.
    pub async fn release(&self, name: &str, holder: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM scheduler_lease WHERE name = ?1 AND holder = ?2")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Reads the current lease row, live or not.
    pub async fn current(&self, name: &str) -> DbResult<Option<Lease>> {
        let lease = sqlx::query_as::<_, Lease>(
            "SELECT name, holder, expires_at FROM scheduler_lease WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lease)
    }
}
