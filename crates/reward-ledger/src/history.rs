//! # Points History Ledger
//!
//! The append-only record behind every balance change, plus its read path.
//!
//! ## Entry Shapes
//! ```text
//!   kind     points        date                 transaction_id
//!   ───────  ────────────  ───────────────────  ──────────────
//!   earn     +points       transaction date     key of the spend
//!   redeem   -requested    time of redemption   none
//!   expired  -points       time of the tick     key of the spend
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use reward_core::validation::validate_user_id;
use reward_core::{HistoryQuery, Page, PointsHistoryEntry, PointsKind, Transaction, UserId};
use reward_db::{Database, DbResult, NewHistoryEntry, SqliteConnection};

use crate::error::LedgerResult;

/// Reason recorded on redemption entries.
pub const REDEEM_REASON: &str = "Points redeemed for discount";

/// One page of history plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<PointsHistoryEntry>,
    pub page: Page,
    /// Entries matching the filters across all pages.
    pub total: i64,
}

impl HistoryPage {
    pub fn total_pages(&self) -> i64 {
        if self.total == 0 {
            0
        } else {
            (self.total + self.page.size - 1) / self.page.size
        }
    }
}

/// Read and append access to the points history.
#[derive(Debug, Clone)]
pub struct PointsHistoryLedger {
    db: Database,
}

impl PointsHistoryLedger {
    pub fn new(db: Database) -> Self {
        PointsHistoryLedger { db }
    }

    /// Returns one page of a user's history, newest first.
    ///
    /// The page is normalised again here so a hand-built [`Page`] with a
    /// zero or oversized value behaves like the builder's.
    pub async fn query(&self, query: &HistoryQuery) -> LedgerResult<Vec<PointsHistoryEntry>> {
        let query = normalized(query)?;
        Ok(self.db.history().query(&query).await?)
    }

    /// [`query`](Self::query) plus the total match count.
    pub async fn query_page(&self, query: &HistoryQuery) -> LedgerResult<HistoryPage> {
        let query = normalized(query)?;
        let repo = self.db.history();

        let entries = repo.query(&query).await?;
        let total = repo.count(&query).await?;

        Ok(HistoryPage {
            entries,
            page: query.page,
            total,
        })
    }

    /// Appends an entry inside the caller's unit of work.
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        entry: &NewHistoryEntry,
    ) -> DbResult<PointsHistoryEntry> {
        self.db.history().append(conn, entry).await
    }

    /// Signed sum of every entry for the user.
    pub async fn sum_for_user(&self, user_id: UserId) -> LedgerResult<i64> {
        Ok(self.db.history().sum_all(user_id).await?)
    }

    /// Signed sum of one kind of entry for the user.
    pub async fn sum_by_kind(&self, user_id: UserId, kind: PointsKind) -> LedgerResult<i64> {
        Ok(self.db.history().sum_by_kind(user_id, kind).await?)
    }
}

fn normalized(query: &HistoryQuery) -> LedgerResult<HistoryQuery> {
    validate_user_id(query.user_id)?;
    let mut query = query.clone();
    query.page = Page::normalize(query.page.number, query.page.size);
    Ok(query)
}

// =============================================================================
// Entry Constructors
// =============================================================================

/// Earn entry for a freshly recorded transaction, dated at the spend.
pub fn earn_entry(txn: &Transaction) -> NewHistoryEntry {
    NewHistoryEntry {
        user_id: txn.user_id,
        points: txn.points_earned,
        kind: PointsKind::Earn,
        reason: format!("Points earned on {} purchase {}", txn.category, txn.product_code),
        date: txn.transaction_date,
        transaction_id: Some(txn.transaction_id.clone()),
    }
}

/// Redeem entry for `points` taken at `at`.
pub fn redeem_entry(user_id: UserId, points: i64, at: DateTime<Utc>) -> NewHistoryEntry {
    NewHistoryEntry {
        user_id,
        points: -points,
        kind: PointsKind::Redeem,
        reason: REDEEM_REASON.to_string(),
        date: at,
        transaction_id: None,
    }
}

/// Expired entry removing a transaction's earned points at `at`.
pub fn expired_entry(txn: &Transaction, at: DateTime<Utc>) -> NewHistoryEntry {
    NewHistoryEntry {
        user_id: txn.user_id,
        points: -txn.points_earned,
        kind: PointsKind::Expired,
        reason: format!("Points expired from transaction {}", txn.transaction_id),
        date: at,
        transaction_id: Some(txn.transaction_id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use reward_db::DbConfig;

    fn spend(points: i64) -> Transaction {
        let date = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        Transaction {
            id: 1,
            transaction_id: "4b1d".into(),
            user_id: 5,
            amount_cents: points * 100,
            category: "grocery".into(),
            transaction_date: date,
            product_code: "EGGS-12".into(),
            points_earned: points,
            created_on: date,
            expired_at: None,
        }
    }

    #[test]
    fn test_entry_signs_and_dates() {
        let txn = spend(40);
        let later = txn.transaction_date + Duration::days(400);

        let earn = earn_entry(&txn);
        assert_eq!((earn.points, earn.kind), (40, PointsKind::Earn));
        assert_eq!(earn.date, txn.transaction_date);
        assert_eq!(earn.transaction_id.as_deref(), Some("4b1d"));

        let expired = expired_entry(&txn, later);
        assert_eq!((expired.points, expired.kind), (-40, PointsKind::Expired));
        assert_eq!(expired.date, later);

        let redeem = redeem_entry(5, 15, later);
        assert_eq!((redeem.points, redeem.kind), (-15, PointsKind::Redeem));
        assert_eq!(redeem.reason, REDEEM_REASON);
        assert!(redeem.transaction_id.is_none());
    }

    #[test]
    fn test_total_pages() {
        let page = |total| HistoryPage {
            entries: vec![],
            page: Page::normalize(1, 10),
            total,
        };
        assert_eq!(page(0).total_pages(), 0);
        assert_eq!(page(10).total_pages(), 1);
        assert_eq!(page(11).total_pages(), 2);
    }

    #[tokio::test]
    async fn test_query_normalizes_hand_built_page() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = db.users().create("ivy", "ivy@example.com").await.unwrap();
        let ledger = PointsHistoryLedger::new(db.clone());

        let mut tx = db.begin().await.unwrap();
        for i in 0..12 {
            ledger
                .append(&mut tx, &redeem_entry(user.id, i + 1, Utc::now()))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let mut query = HistoryQuery::new(user.id);
        query.page = Page { number: 0, size: 0 };

        let page = ledger.query_page(&query).await.unwrap();
        assert_eq!(page.page, Page { number: 1, size: 10 });
        assert_eq!(page.entries.len(), 10);
        assert_eq!(page.total, 12);
        assert_eq!(page.total_pages(), 2);

        assert_eq!(ledger.sum_for_user(user.id).await.unwrap(), -78);
        assert_eq!(
            ledger.sum_by_kind(user.id, PointsKind::Redeem).await.unwrap(),
            -78
        );
    }

    #[tokio::test]
    async fn test_query_rejects_bad_user_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = PointsHistoryLedger::new(db);

        assert!(ledger.query(&HistoryQuery::new(0)).await.is_err());
    }
}
