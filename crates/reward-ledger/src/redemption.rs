//! # Redemption Processor
//!
//! Spends points against a user's balance.
//!
//! ## What May Be Redeemed
//! ```text
//!   earned (12 mo)  = Σ earn entries dated within the last 12 months
//!   redeemable      = max(0, min(earned (12 mo), total_points))
//!
//!   requested > redeemable  →  InsufficientPoints, nothing written
//!   otherwise               →  total_points    -= requested
//!                              points_redeemed += requested
//!                              history         += (redeem, -requested)
//! ```
//!
//! The `total_points` bound keeps a balance from going negative when
//! earlier redemptions already consumed points that still sit inside the
//! 12-month window.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use reward_core::validation::validate_points_to_redeem;
use reward_core::{PointsHistoryEntry, UserId};
use reward_db::{Database, DbError};

use crate::balance::BalanceStore;
use crate::error::{LedgerError, LedgerResult};
use crate::history::{redeem_entry, PointsHistoryLedger};
use crate::locks::UserLocks;
use crate::retry::{with_conflict_retry, RetryPolicy};

/// Result of a successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionOutcome {
    pub user_id: UserId,
    pub points_redeemed: i64,
    /// `total_points` after the redemption.
    pub remaining_balance: i64,
    pub history_entry: PointsHistoryEntry,
}

/// Validates and applies point redemptions.
#[derive(Debug, Clone)]
pub struct RedemptionProcessor {
    db: Database,
    locks: UserLocks,
    retry: RetryPolicy,
    balances: BalanceStore,
    history: PointsHistoryLedger,
}

impl RedemptionProcessor {
    pub fn new(db: Database, locks: UserLocks, retry: RetryPolicy) -> Self {
        RedemptionProcessor {
            balances: BalanceStore::new(db.clone()),
            history: PointsHistoryLedger::new(db.clone()),
            db,
            locks,
            retry,
        }
    }

    /// Redeems `points` for `user_id`.
    ///
    /// ## Errors
    /// - `Validation` if `points` is not positive
    /// - `UserNotFound` if the user does not exist
    /// - `InsufficientPoints` if `points` exceeds what is redeemable
    pub async fn redeem(&self, user_id: UserId, points: i64) -> LedgerResult<RedemptionOutcome> {
        validate_points_to_redeem(points)?;

        let _guard = self.locks.acquire(user_id).await;

        let outcome = with_conflict_retry(&self.retry, "redeem_points", || {
            self.redeem_once(user_id, points)
        })
        .await?;

        info!(
            user_id,
            points,
            remaining = outcome.remaining_balance,
            "Points redeemed"
        );

        Ok(outcome)
    }

    async fn redeem_once(&self, user_id: UserId, points: i64) -> LedgerResult<RedemptionOutcome> {
        let mut tx = self.db.begin().await?;

        if !self.db.users().exists(&mut *tx, user_id).await? {
            return Err(LedgerError::UserNotFound(user_id));
        }

        // Write first so the reads below see a stable balance.
        self.balances.lock_row(&mut tx, user_id).await?;

        let now = Utc::now();
        let earned = self.balances.available_points_in(&mut tx, user_id, now).await?;
        let balance = self.balances.get_in(&mut tx, user_id).await?;
        let redeemable = earned.min(balance.total_points).max(0);

        if points > redeemable {
            debug!(
                user_id,
                points,
                earned,
                total_points = balance.total_points,
                "Redemption rejected"
            );
            return Err(LedgerError::insufficient(user_id, points, redeemable));
        }

        let updated = self.balances.adjust_balance(&mut tx, user_id, -points, points).await?;
        let entry = self.history.append(&mut tx, &redeem_entry(user_id, points, now)).await?;

        tx.commit().await.map_err(DbError::from)?;

        Ok(RedemptionOutcome {
            user_id,
            points_redeemed: points,
            remaining_balance: updated.total_points,
            history_entry: entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::TransactionRecorder;
    use chrono::Duration;
    use reward_core::{Money, MultiplierTable, NewTransaction, PointsKind};
    use reward_db::DbConfig;
    use std::sync::Arc;

    struct Fixture {
        db: Database,
        recorder: TransactionRecorder,
        processor: RedemptionProcessor,
        user_id: UserId,
    }

    async fn setup_with(db: Database) -> Fixture {
        let user = db.users().create("kai", "kai@example.com").await.unwrap();
        let locks = UserLocks::new();
        let table = MultiplierTable::from_entries([("grocery", 2)]).unwrap();
        Fixture {
            recorder: TransactionRecorder::new(
                db.clone(),
                Arc::new(table),
                locks.clone(),
                RetryPolicy::default(),
            ),
            processor: RedemptionProcessor::new(db.clone(), locks, RetryPolicy::default()),
            db,
            user_id: user.id,
        }
    }

    async fn setup() -> Fixture {
        setup_with(Database::new(DbConfig::in_memory()).await.unwrap()).await
    }

    async fn earn(f: &Fixture, cents: i64, age_days: i64) {
        f.recorder
            .record(
                NewTransaction::new(f.user_id, Money::from_cents(cents), "grocery", "MILK")
                    .dated(Utc::now() - Duration::days(age_days)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_redeem_within_balance() {
        let f = setup().await;
        earn(&f, 10_000, 1).await; // 200 points

        let outcome = f.processor.redeem(f.user_id, 150).await.unwrap();
        assert_eq!(outcome.points_redeemed, 150);
        assert_eq!(outcome.remaining_balance, 50);
        assert_eq!(outcome.history_entry.points, -150);
        assert_eq!(outcome.history_entry.kind, PointsKind::Redeem);
        assert_eq!(outcome.history_entry.reason, "Points redeemed for discount");

        let balance = f.db.balances().get(f.user_id).await.unwrap().unwrap();
        assert_eq!(balance.total_points, 50);
        assert_eq!(balance.points_redeemed, 150);
    }

    #[tokio::test]
    async fn test_insufficient_points_changes_nothing() {
        let f = setup().await;
        earn(&f, 2_500, 1).await; // 50 points

        let err = f.processor.redeem(f.user_id, 80).await.unwrap_err();
        match err {
            LedgerError::InsufficientPoints {
                requested,
                available,
                shortfall,
                ..
            } => {
                assert_eq!((requested, available, shortfall), (80, 50, 30));
            }
            other => panic!("unexpected error: {other}"),
        }

        let balance = f.db.balances().get(f.user_id).await.unwrap().unwrap();
        assert_eq!(balance.total_points, 50);
        assert_eq!(balance.points_redeemed, 0);
        assert_eq!(f.db.history().sum_by_kind(f.user_id, PointsKind::Redeem).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_old_earns_are_not_redeemable() {
        let f = setup().await;
        earn(&f, 5_000, 400).await; // 100 points, outside the window
        earn(&f, 1_000, 30).await; // 20 points

        let err = f.processor.redeem(f.user_id, 50).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientPoints { available: 20, .. }));

        assert!(f.processor.redeem(f.user_id, 20).await.is_ok());
    }

    #[tokio::test]
    async fn test_repeated_redemptions_stop_at_balance() {
        let f = setup().await;
        earn(&f, 5_000, 5).await; // 100 points

        f.processor.redeem(f.user_id, 60).await.unwrap();

        // 100 earned in the window, but only 40 left on the balance.
        let err = f.processor.redeem(f.user_id, 60).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientPoints { available: 40, .. }));

        let outcome = f.processor.redeem(f.user_id, 40).await.unwrap();
        assert_eq!(outcome.remaining_balance, 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let f = setup().await;

        assert!(matches!(
            f.processor.redeem(f.user_id, 0).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            f.processor.redeem(f.user_id, -10).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            f.processor.redeem(4242, 10).await,
            Err(LedgerError::UserNotFound(4242))
        ));
        assert!(matches!(
            f.processor.redeem(f.user_id, 10).await,
            Err(LedgerError::InsufficientPoints { available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_never_overdraw() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("ledger.db")))
            .await
            .unwrap();
        let f = setup_with(db).await;
        earn(&f, 5_000, 2).await; // 100 points

        let mut handles = Vec::new();
        for _ in 0..5 {
            let processor = f.processor.clone();
            let user_id = f.user_id;
            handles.push(tokio::spawn(async move { processor.redeem(user_id, 30).await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(matches!(err, LedgerError::InsufficientPoints { .. })),
            }
        }
        assert_eq!(succeeded, 3);

        let balance = f.db.balances().get(f.user_id).await.unwrap().unwrap();
        assert_eq!(balance.total_points, 10);
        assert_eq!(balance.points_redeemed, 90);
        assert_eq!(f.db.history().sum_all(f.user_id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_failed_history_append_leaves_balance_untouched() {
        let f = setup().await;
        earn(&f, 10_000, 1).await; // 200 points

        sqlx::query(
            "CREATE TRIGGER reject_redeem BEFORE INSERT ON points_history \
             WHEN NEW.kind = 'redeem' BEGIN SELECT RAISE(ABORT, 'redeem rejected'); END",
        )
        .execute(f.db.pool())
        .await
        .unwrap();

        let err = f.processor.redeem(f.user_id, 50).await.unwrap_err();
        assert!(matches!(err, LedgerError::Infrastructure(_)));

        let balance = f.db.balances().get(f.user_id).await.unwrap().unwrap();
        assert_eq!(balance.total_points, 200);
        assert_eq!(balance.points_redeemed, 0);
        assert_eq!(f.db.history().sum_all(f.user_id).await.unwrap(), 200);
    }
}
