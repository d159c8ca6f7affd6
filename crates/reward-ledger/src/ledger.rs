//! # Ledger Facade
//!
//! One value that owns the database, the multiplier table and the lock
//! registry, and hands out services that share them.
//!
//! ```text
//!                    ┌───────────────────────────┐
//!                    │          Ledger           │
//!                    │  Database · UserLocks ·   │
//!                    │  Arc<MultiplierTable>     │
//!                    └─────────────┬─────────────┘
//!        ┌──────────────┬──────────┼──────────────┬──────────────┐
//!        ▼              ▼          ▼              ▼              ▼
//!   recorder()    redemption()  balances()    history()    scheduler()
//! ```
//!
//! Every writer built here uses the same [`UserLocks`], so recording,
//! redemption and expiration for one user never interleave in-process.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use reward_core::{HistoryQuery, MultiplierTable, NewTransaction, PointsBalance, Transaction, UserId};
use reward_db::Database;

use crate::balance::BalanceStore;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::history::{HistoryPage, PointsHistoryLedger};
use crate::locks::UserLocks;
use crate::recorder::TransactionRecorder;
use crate::redemption::{RedemptionOutcome, RedemptionProcessor};
use crate::scheduler::ExpirationScheduler;

/// Balance, redeemable points and the newest page of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub balance: PointsBalance,
    pub available_points: i64,
    pub history: HistoryPage,
}

/// Result of comparing a user's running total to their history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub user_id: UserId,
    pub total_points: i64,
    pub history_sum: i64,
    pub consistent: bool,
}

/// Entry point bundling every ledger service.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    config: LedgerConfig,
    locks: UserLocks,
    multipliers: Arc<MultiplierTable>,
    recorder: TransactionRecorder,
    redemption: RedemptionProcessor,
    balances: BalanceStore,
    history: PointsHistoryLedger,
}

impl Ledger {
    /// Builds a ledger over an open database.
    pub fn new(db: Database, multipliers: MultiplierTable, config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;

        let locks = UserLocks::new();
        let multipliers = Arc::new(multipliers);
        let retry = config.ledger.retry.clone();

        Ok(Ledger {
            recorder: TransactionRecorder::new(
                db.clone(),
                multipliers.clone(),
                locks.clone(),
                retry.clone(),
            ),
            redemption: RedemptionProcessor::new(db.clone(), locks.clone(), retry),
            balances: BalanceStore::new(db.clone()),
            history: PointsHistoryLedger::new(db.clone()),
            db,
            config,
            locks,
            multipliers,
        })
    }

    /// Opens the configured database and multiplier file.
    pub async fn open(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;

        let db = Database::new(config.db_config()).await?;
        let multipliers = config.load_multipliers()?;

        info!(
            db_path = %config.database.path.display(),
            categories = multipliers.len(),
            "Ledger opened"
        );

        Self::new(db, multipliers, config)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    pub fn multipliers(&self) -> &MultiplierTable {
        &self.multipliers
    }

    pub fn recorder(&self) -> &TransactionRecorder {
        &self.recorder
    }

    pub fn redemption(&self) -> &RedemptionProcessor {
        &self.redemption
    }

    pub fn balances(&self) -> &BalanceStore {
        &self.balances
    }

    pub fn history(&self) -> &PointsHistoryLedger {
        &self.history
    }

    /// An expiration scheduler sharing this ledger's locks.
    pub fn scheduler(&self) -> LedgerResult<ExpirationScheduler> {
        ExpirationScheduler::new(self.db.clone(), self.locks.clone(), &self.config)
    }

    // =========================================================================
    // Shortcuts
    // =========================================================================

    pub async fn record(&self, txn: NewTransaction) -> LedgerResult<Transaction> {
        self.recorder.record(txn).await
    }

    pub async fn redeem(&self, user_id: UserId, points: i64) -> LedgerResult<RedemptionOutcome> {
        self.redemption.redeem(user_id, points).await
    }

    /// Balance plus the first page of history.
    ///
    /// A user without a balance row reports zeros rather than an error.
    pub async fn balance_with_history(&self, user_id: UserId) -> LedgerResult<BalanceSnapshot> {
        if !self.db.users().exists(self.db.pool(), user_id).await? {
            return Err(LedgerError::UserNotFound(user_id));
        }

        let balance = self.balances.get_balance_or_zero(user_id).await?;
        let available_points = self.balances.available_points(user_id).await?;
        let history = self.history.query_page(&HistoryQuery::new(user_id)).await?;

        Ok(BalanceSnapshot {
            balance,
            available_points,
            history,
        })
    }

    /// Compares `total_points` to the signed sum of the user's history.
    pub async fn audit_user(&self, user_id: UserId) -> LedgerResult<AuditReport> {
        let total_points = self.balances.get_balance_or_zero(user_id).await?.total_points;
        let history_sum = self.history.sum_for_user(user_id).await?;
        let consistent = total_points == history_sum;

        if !consistent {
            warn!(user_id, total_points, history_sum, "Balance does not match history");
        }

        Ok(AuditReport {
            user_id,
            total_points,
            history_sum,
            consistent,
        })
    }

    /// Audits every user with a balance row.
    pub async fn audit_all(&self) -> LedgerResult<Vec<AuditReport>> {
        let balances = self.db.balances().list().await?;
        let mut reports = Vec::with_capacity(balances.len());

        for balance in balances {
            reports.push(self.audit_user(balance.user_id).await?);
        }

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Months, Utc};
    use reward_core::{Money, PointsKind};
    use reward_db::DbConfig;

    async fn ledger() -> Ledger {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let table = MultiplierTable::from_entries([("grocery", 2), ("electronics", 3)]).unwrap();
        Ledger::new(db, table, LedgerConfig::new()).unwrap()
    }

    #[tokio::test]
    async fn test_full_lifecycle_stays_consistent() {
        let ledger = ledger().await;
        let user = ledger.database().users().create("mia", "mia@example.com").await.unwrap();
        let now = Utc::now();

        ledger
            .record(NewTransaction::new(user.id, Money::from_cents(10_000), "grocery", "A"))
            .await
            .unwrap();
        ledger
            .record(NewTransaction::new(user.id, Money::from_cents(10_000), "unknown", "B"))
            .await
            .unwrap();
        ledger
            .record(
                NewTransaction::new(user.id, Money::from_cents(5_000), "misc", "C")
                    .dated(now - Months::new(13)),
            )
            .await
            .unwrap();

        assert_eq!(ledger.balances().get_balance(user.id).await.unwrap().total_points, 350);

        let outcome = ledger.redeem(user.id, 150).await.unwrap();
        assert_eq!(outcome.remaining_balance, 200);

        let report = ledger.scheduler().unwrap().run_tick_at(now).await.unwrap();
        assert_eq!(report.points_expired, 50);

        let audit = ledger.audit_user(user.id).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.total_points, 150);
        assert_eq!(audit.history_sum, 150);

        let snapshot = ledger.balance_with_history(user.id).await.unwrap();
        assert_eq!(snapshot.balance.total_points, 150);
        assert_eq!(snapshot.balance.points_redeemed, 150);
        assert_eq!(snapshot.available_points, 300);
        assert_eq!(snapshot.history.total, 5);
        assert_eq!(
            snapshot
                .history
                .entries
                .iter()
                .filter(|e| e.kind == PointsKind::Expired)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_snapshot_for_new_user_is_zero() {
        let ledger = ledger().await;
        let user = ledger.database().users().create("noa", "noa@example.com").await.unwrap();

        let snapshot = ledger.balance_with_history(user.id).await.unwrap();
        assert_eq!(snapshot.balance, PointsBalance::empty(user.id));
        assert_eq!(snapshot.available_points, 0);
        assert!(snapshot.history.entries.is_empty());

        assert!(matches!(
            ledger.balance_with_history(777).await,
            Err(LedgerError::UserNotFound(777))
        ));
    }

    #[tokio::test]
    async fn test_audit_all_covers_every_balance() {
        let ledger = ledger().await;
        for name in ["ola", "pia"] {
            let user = ledger
                .database()
                .users()
                .create(name, &format!("{name}@example.com"))
                .await
                .unwrap();
            ledger
                .record(NewTransaction::new(user.id, Money::from_cents(1_000), "electronics", "X"))
                .await
                .unwrap();
        }

        let reports = ledger.audit_all().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.consistent && r.total_points == 30));
    }

    #[tokio::test]
    async fn test_multipliers_are_shared() {
        let ledger = ledger().await;
        assert_eq!(ledger.multipliers().multiplier("electronics"), 3);
        assert_eq!(ledger.recorder().multipliers().multiplier("electronics"), 3);
    }
}
