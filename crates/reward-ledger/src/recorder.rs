//! # Transaction Recorder
//!
//! Turns a spend into a stored transaction, a balance credit and an earn
//! entry, all committed together.
//!
//! ## Recording Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  NewTransaction                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate ──► key = uuid v4 ──► points = floor(amount) × multiplier     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  lock(user) ─► BEGIN                                                    │
//! │                 ├── user exists?          no → UserNotFound             │
//! │                 ├── INSERT transactions                                 │
//! │                 ├── balance += points                                   │
//! │                 ├── history += (earn, points)                           │
//! │                 └── COMMIT                                              │
//! │                                                                         │
//! │  A write conflict rolls everything back and the unit is re-run with    │
//! │  the same key, date and points.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use reward_core::validation::validate_new_transaction;
use reward_core::{MultiplierTable, NewTransaction, Transaction};
use reward_db::{Database, DbError, InsertTransaction};

use crate::balance::BalanceStore;
use crate::error::{LedgerError, LedgerResult};
use crate::history::{earn_entry, PointsHistoryLedger};
use crate::locks::UserLocks;
use crate::retry::{with_conflict_retry, RetryPolicy};

/// Records spend transactions and credits the points they earn.
#[derive(Debug, Clone)]
pub struct TransactionRecorder {
    db: Database,
    multipliers: Arc<MultiplierTable>,
    locks: UserLocks,
    retry: RetryPolicy,
    balances: BalanceStore,
    history: PointsHistoryLedger,
}

impl TransactionRecorder {
    pub fn new(
        db: Database,
        multipliers: Arc<MultiplierTable>,
        locks: UserLocks,
        retry: RetryPolicy,
    ) -> Self {
        TransactionRecorder {
            balances: BalanceStore::new(db.clone()),
            history: PointsHistoryLedger::new(db.clone()),
            db,
            multipliers,
            locks,
            retry,
        }
    }

    /// The multiplier table this recorder prices spends with.
    pub fn multipliers(&self) -> &MultiplierTable {
        &self.multipliers
    }

    /// Records a spend and credits its points.
    ///
    /// ## Errors
    /// - `Validation` for a non-positive amount, blank labels, or an amount
    ///   whose points overflow
    /// - `UserNotFound` if the user does not exist
    /// - `Conflict` once the retry budget is spent
    ///
    /// Nothing is written when any of these is returned.
    pub async fn record(&self, txn: NewTransaction) -> LedgerResult<Transaction> {
        validate_new_transaction(&txn)?;

        let transaction_id = Uuid::new_v4().to_string();
        let transaction_date = txn.transaction_date.unwrap_or_else(Utc::now);
        let points = self.multipliers.points_for(txn.amount, &txn.category)?;

        debug!(
            user_id = txn.user_id,
            category = %txn.category,
            amount = %txn.amount,
            points,
            "Recording transaction"
        );

        let _guard = self.locks.acquire(txn.user_id).await;

        let recorded = with_conflict_retry(&self.retry, "record_transaction", || {
            self.record_once(&txn, &transaction_id, transaction_date, points)
        })
        .await?;

        info!(
            user_id = recorded.user_id,
            transaction_id = %recorded.transaction_id,
            points = recorded.points_earned,
            "Transaction recorded"
        );

        Ok(recorded)
    }

    async fn record_once(
        &self,
        txn: &NewTransaction,
        transaction_id: &str,
        transaction_date: DateTime<Utc>,
        points: i64,
    ) -> LedgerResult<Transaction> {
        let mut tx = self.db.begin().await?;

        if !self.db.users().exists(&mut *tx, txn.user_id).await? {
            return Err(LedgerError::UserNotFound(txn.user_id));
        }

        let row = InsertTransaction {
            transaction_id,
            user_id: txn.user_id,
            amount_cents: txn.amount.cents(),
            category: &txn.category,
            product_code: &txn.product_code,
            transaction_date,
            points_earned: points,
            created_on: Utc::now(),
        };

        let recorded = self.db.transactions().insert(&mut tx, &row).await?;
        self.balances.adjust(&mut tx, txn.user_id, points, 0).await?;
        self.history.append(&mut tx, &earn_entry(&recorded)).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use reward_core::{HistoryQuery, Money, PointsKind};
    use reward_db::DbConfig;

    async fn setup() -> (Database, TransactionRecorder, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = db.users().create("jun", "jun@example.com").await.unwrap();
        let table =
            MultiplierTable::from_entries([("grocery", 2), ("electronics", 3)]).unwrap();
        let recorder =
            TransactionRecorder::new(db.clone(), Arc::new(table), UserLocks::new(), RetryPolicy::default());
        (db, recorder, user.id)
    }

    #[tokio::test]
    async fn test_records_with_multipliers() {
        let (db, recorder, user_id) = setup().await;

        let grocery = recorder
            .record(NewTransaction::new(user_id, Money::from_cents(10_000), "grocery", "MILK"))
            .await
            .unwrap();
        assert_eq!(grocery.points_earned, 200);
        assert_eq!(grocery.amount_cents, 10_000);
        assert!(Uuid::parse_str(&grocery.transaction_id).is_ok());

        let other = recorder
            .record(NewTransaction::new(user_id, Money::from_cents(10_099), "unknown", "GIFT"))
            .await
            .unwrap();
        assert_eq!(other.points_earned, 100);
        assert_ne!(grocery.transaction_id, other.transaction_id);

        let balance = db.balances().get(user_id).await.unwrap().unwrap();
        assert_eq!(balance.total_points, 300);
        assert_eq!(balance.points_redeemed, 0);

        let entries = db.history().query(&HistoryQuery::new(user_id)).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.kind == PointsKind::Earn));
        assert_eq!(entries.iter().map(|e| e.points).sum::<i64>(), 300);
    }

    #[tokio::test]
    async fn test_earn_entry_carries_transaction_date() {
        let (db, recorder, user_id) = setup().await;
        let date = Utc.with_ymd_and_hms(2026, 1, 20, 15, 0, 0).unwrap();

        let txn = recorder
            .record(
                NewTransaction::new(user_id, Money::from_cents(500), "electronics", "CABLE")
                    .dated(date),
            )
            .await
            .unwrap();
        assert_eq!(txn.transaction_date, date);

        let entries = db.history().query(&HistoryQuery::new(user_id)).await.unwrap();
        assert_eq!(entries[0].date, date);
        assert_eq!(entries[0].points, 15);
        assert_eq!(entries[0].transaction_id.as_deref(), Some(txn.transaction_id.as_str()));
    }

    #[tokio::test]
    async fn test_sub_unit_amount_earns_zero() {
        let (db, recorder, user_id) = setup().await;

        let txn = recorder
            .record(NewTransaction::new(user_id, Money::from_cents(99), "grocery", "GUM"))
            .await
            .unwrap();
        assert_eq!(txn.points_earned, 0);
        assert_eq!(db.balances().get(user_id).await.unwrap().unwrap().total_points, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_writes_nothing() {
        let (db, recorder, _) = setup().await;

        let err = recorder
            .record(NewTransaction::new(999, Money::from_cents(1_000), "grocery", "MILK"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound(999)));
        assert!(db.balances().get(999).await.unwrap().is_none());
        assert!(db.transactions().list_for_user(999, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let (db, recorder, user_id) = setup().await;

        let err = recorder
            .record(NewTransaction::new(user_id, Money::zero(), "grocery", "MILK"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = recorder
            .record(NewTransaction::new(user_id, Money::from_cents(100), "", "MILK"))
            .await
            .unwrap_err();
        assert!(err.is_domain_error());

        assert!(db.transactions().list_for_user(user_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backdated_transaction() {
        let (db, recorder, user_id) = setup().await;
        let old = Utc::now() - Duration::days(400);

        recorder
            .record(NewTransaction::new(user_id, Money::from_cents(2_500), "toys", "BLOCKS").dated(old))
            .await
            .unwrap();

        let txns = db.transactions().list_for_user(user_id, 10).await.unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].transaction_date, old);
        assert!(!txns[0].is_expired());
    }

    #[tokio::test]
    async fn test_overflowing_points_are_rejected() {
        let (db, _, user_id) = setup().await;
        let table = MultiplierTable::from_entries([("jackpot", 1_000)]).unwrap();
        let recorder =
            TransactionRecorder::new(db.clone(), Arc::new(table), UserLocks::new(), RetryPolicy::default());

        let err = recorder
            .record(NewTransaction::new(user_id, Money::from_cents(i64::MAX), "jackpot", "BIG"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(db.balances().get(user_id).await.unwrap().is_none());
        assert!(db.transactions().list_for_user(user_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_history_append_rolls_back_everything() {
        let (db, recorder, user_id) = setup().await;
        recorder
            .record(NewTransaction::new(user_id, Money::from_cents(1_000), "grocery", "MILK"))
            .await
            .unwrap(); // 20 points

        sqlx::query(
            "CREATE TRIGGER reject_earn BEFORE INSERT ON points_history \
             WHEN NEW.kind = 'earn' BEGIN SELECT RAISE(ABORT, 'earn rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = recorder
            .record(NewTransaction::new(user_id, Money::from_cents(5_000), "grocery", "BREAD"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Infrastructure(_)));

        assert_eq!(db.transactions().list_for_user(user_id, 10).await.unwrap().len(), 1);
        assert_eq!(db.balances().get(user_id).await.unwrap().unwrap().total_points, 20);
        assert_eq!(db.history().sum_all(user_id).await.unwrap(), 20);
    }
}
