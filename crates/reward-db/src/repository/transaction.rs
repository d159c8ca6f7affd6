//! # Transaction Repository
//!
//! Persists recorded spend transactions and the expiry mark the scheduler
//! sets on them.
//!
//! ## Lifecycle of a Row
//! ```text
//!   insert (recorder)                      mark_expired (scheduler)
//!   ──────────────────                     ───────────────────────────
//!   expired_at = NULL   ── age ≥ window ──► expired_at = <tick time>
//!                                           (conditional: only if NULL)
//! ```
//!
//! `mark_expired` is the only mutation after insert. It succeeds at most
//! once per row, which is what keeps a second scheduler tick from
//! expiring the same points twice.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use reward_core::{Transaction, UserId};

const TRANSACTION_COLUMNS: &str = "id, transaction_id, user_id, amount_cents, category, \
     transaction_date, product_code, points_earned, created_on, expired_at";

/// Column values for a new transaction row.
#[derive(Debug, Clone)]
pub struct InsertTransaction<'a> {
    pub transaction_id: &'a str,
    pub user_id: UserId,
    pub amount_cents: i64,
    pub category: &'a str,
    pub product_code: &'a str,
    pub transaction_date: DateTime<Utc>,
    pub points_earned: i64,
    pub created_on: DateTime<Utc>,
}

/// Repository for transaction operations.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Inserts a transaction inside the caller's unit of work.
    ///
    /// ## Errors
    /// - `UniqueViolation` if `transaction_id` was already used
    /// - `ForeignKeyViolation` if the user does not exist
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        row: &InsertTransaction<'_>,
    ) -> DbResult<Transaction> {
        debug!(
            transaction_id = %row.transaction_id,
            user_id = row.user_id,
            points = row.points_earned,
            "Inserting transaction"
        );

        let sql = format!(
            r#"
            INSERT INTO transactions (
                transaction_id, user_id, amount_cents, category,
                transaction_date, product_code, points_earned, created_on
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );

        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .bind(row.transaction_id)
            .bind(row.user_id)
            .bind(row.amount_cents)
            .bind(row.category)
            .bind(row.transaction_date)
            .bind(row.product_code)
            .bind(row.points_earned)
            .bind(row.created_on)
            .fetch_one(&mut *conn)
            .await?;

        Ok(txn)
    }

    /// Gets a transaction by its storage row id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");

        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    /// Gets a transaction by its idempotency key.
    pub async fn get_by_transaction_id(&self, transaction_id: &str) -> DbResult<Option<Transaction>> {
        let sql =
            format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_id = ?1");

        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    /// Lists a user's transactions, newest first.
    pub async fn list_for_user(&self, user_id: UserId, limit: i64) -> DbResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE user_id = ?1 ORDER BY transaction_date DESC, id DESC LIMIT ?2"
        );

        let txns = sqlx::query_as::<_, Transaction>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(txns)
    }

    /// Finds transactions whose points are due to expire.
    ///
    /// ## Selection
    /// - `transaction_date <= cutoff`
    /// - `points_earned > 0`
    /// - not already expired
    /// - ordered after `after`, a `(transaction_date, id)` cursor taken from
    ///   the last row of the previous page
    ///
    /// Oldest first, so an interrupted tick resumes where it left off. Rows
    /// left unexpired on an earlier page sit behind the cursor and are not
    /// returned again.
    pub async fn find_expirable(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<(DateTime<Utc>, i64)>,
        limit: i64,
    ) -> DbResult<Vec<Transaction>> {
        let (after_date, after_id) = after.unzip();

        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE transaction_date <= ?1 AND points_earned > 0 AND expired_at IS NULL \
               AND (?3 IS NULL OR transaction_date > ?3 OR (transaction_date = ?3 AND id > ?4)) \
             ORDER BY transaction_date ASC, id ASC LIMIT ?2"
        );

        let txns = sqlx::query_as::<_, Transaction>(&sql)
            .bind(cutoff)
            .bind(limit)
            .bind(after_date)
            .bind(after_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(txns)
    }

    /// Marks a transaction's points as expired.
    ///
    /// ## Returns
    /// `false` when the row was already expired (or does not exist), in
    /// which case nothing changed and the caller must not adjust the
    /// balance.
    pub async fn mark_expired(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET expired_at = ?2 WHERE id = ?1 AND expired_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    async fn setup() -> (Database, UserId) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = db.users().create("carol", "carol@example.com").await.unwrap();
        (db, user.id)
    }

    async fn insert(db: &Database, user_id: UserId, key: &str, age_days: i64, points: i64) -> Transaction {
        let now = Utc::now();
        let row = InsertTransaction {
            transaction_id: key,
            user_id,
            amount_cents: points * 100,
            category: "grocery",
            product_code: "SKU-1",
            transaction_date: now - Duration::days(age_days),
            points_earned: points,
            created_on: now,
        };
        let mut tx = db.begin().await.unwrap();
        let txn = db.transactions().insert(&mut tx, &row).await.unwrap();
        tx.commit().await.unwrap();
        txn
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (db, user_id) = setup().await;
        let txn = insert(&db, user_id, "key-1", 0, 40).await;

        assert_eq!(txn.points_earned, 40);
        assert!(!txn.is_expired());

        let repo = db.transactions();
        assert_eq!(repo.get_by_id(txn.id).await.unwrap(), Some(txn.clone()));
        assert_eq!(
            repo.get_by_transaction_id("key-1").await.unwrap().map(|t| t.id),
            Some(txn.id)
        );
        assert_eq!(repo.list_for_user(user_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let (db, user_id) = setup().await;
        insert(&db, user_id, "dup", 0, 10).await;

        let now = Utc::now();
        let row = InsertTransaction {
            transaction_id: "dup",
            user_id,
            amount_cents: 100,
            category: "grocery",
            product_code: "SKU-1",
            transaction_date: now,
            points_earned: 1,
            created_on: now,
        };
        let mut tx = db.begin().await.unwrap();
        let err = db.transactions().insert(&mut tx, &row).await.unwrap_err();
        assert!(matches!(err, crate::DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_unknown_user_rejected() {
        let (db, user_id) = setup().await;
        let now = Utc::now();
        let row = InsertTransaction {
            transaction_id: "orphan",
            user_id: user_id + 99,
            amount_cents: 100,
            category: "grocery",
            product_code: "SKU-1",
            transaction_date: now,
            points_earned: 1,
            created_on: now,
        };
        let mut tx = db.begin().await.unwrap();
        let err = db.transactions().insert(&mut tx, &row).await.unwrap_err();
        assert!(matches!(err, crate::DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_find_expirable_and_mark_once() {
        let (db, user_id) = setup().await;
        let old = insert(&db, user_id, "old", 400, 50).await;
        insert(&db, user_id, "recent", 30, 30).await;
        insert(&db, user_id, "zero", 500, 0).await;

        let repo = db.transactions();
        let cutoff = Utc::now() - Duration::days(365);

        let due = repo.find_expirable(cutoff, None, 100).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, old.id);

        let mut tx = db.begin().await.unwrap();
        assert!(repo.mark_expired(&mut tx, old.id, Utc::now()).await.unwrap());
        assert!(!repo.mark_expired(&mut tx, old.id, Utc::now()).await.unwrap());
        tx.commit().await.unwrap();

        assert!(repo.find_expirable(cutoff, None, 100).await.unwrap().is_empty());
        assert!(repo.get_by_id(old.id).await.unwrap().unwrap().is_expired());
    }

    #[tokio::test]
    async fn test_find_expirable_pages_with_cursor() {
        let (db, user_id) = setup().await;
        let a = insert(&db, user_id, "a", 500, 10).await;
        let b = insert(&db, user_id, "b", 450, 10).await;
        let c = insert(&db, user_id, "c", 400, 10).await;

        let repo = db.transactions();
        let cutoff = Utc::now() - Duration::days(365);

        let first = repo.find_expirable(cutoff, None, 2).await.unwrap();
        assert_eq!(first.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        // Nothing on the first page was expired, the cursor still moves on.
        let last = first.last().map(|t| (t.transaction_date, t.id));
        let second = repo.find_expirable(cutoff, last, 2).await.unwrap();
        assert_eq!(second.iter().map(|t| t.id).collect::<Vec<_>>(), vec![c.id]);

        let end = second.last().map(|t| (t.transaction_date, t.id));
        assert!(repo.find_expirable(cutoff, end, 2).await.unwrap().is_empty());
    }
}
