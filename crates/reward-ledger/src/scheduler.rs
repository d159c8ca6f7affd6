//! # Expiration Scheduler
//!
//! Background task that expires points earned on old transactions.
//!
//! ## Tick Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Expiration Tick                                  │
//! │                                                                         │
//! │  interval / run_now()                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  cutoff = now - window                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  acquire lease "points-expiration" ── held elsewhere ──► skip tick     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  find_expirable(cutoff, cursor, batch_size)    oldest first           │
//! │       │   pages repeat until one comes back short of batch_size        │
//! │       ▼  for each transaction (own lock, own SQL transaction):         │
//! │  ┌────────────────────────────────────────────────────────────────┐    │
//! │  │  mark expired_at   ── already set ──► skipped                  │    │
//! │  │  balance -= points_earned                                      │    │
//! │  │  history += (expired, -points_earned)                          │    │
//! │  │  COMMIT            ── error ──► logged, failed += 1, continue  │    │
//! │  └────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  release lease, publish ExpirationReport                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Control
//! [`ExpirationScheduler::spawn`] returns an [`ExpirationSchedulerHandle`].
//! A shutdown request is checked between transactions, so a tick in
//! progress stops after the transaction it is working on. Dropping every
//! handle also stops the task.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reward_core::{ExpirationWindow, Transaction};
use reward_db::{Database, DbError};

use crate::balance::BalanceStore;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::history::{expired_entry, PointsHistoryLedger};
use crate::locks::UserLocks;
use crate::retry::{with_conflict_retry, RetryPolicy};

/// Lease name shared by every scheduler instance on the same database.
pub const LEASE_NAME: &str = "points-expiration";

type TickReply = oneshot::Sender<LedgerResult<ExpirationReport>>;

// =============================================================================
// Report
// =============================================================================

/// Outcome of one expiration tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpirationReport {
    /// When the tick ran.
    pub ran_at: DateTime<Utc>,

    /// Transactions dated at or before this were eligible.
    pub cutoff: DateTime<Utc>,

    /// False when another instance held the lease and nothing was done.
    pub lease_acquired: bool,

    pub candidates: usize,
    pub expired: usize,

    /// Already expired by the time this tick reached them.
    pub skipped: usize,

    pub failed: usize,
    pub points_expired: i64,

    /// Shutdown was requested before every candidate was processed.
    pub interrupted: bool,
}

impl ExpirationReport {
    fn new(ran_at: DateTime<Utc>, cutoff: DateTime<Utc>, lease_acquired: bool) -> Self {
        ExpirationReport {
            ran_at,
            cutoff,
            lease_acquired,
            candidates: 0,
            expired: 0,
            skipped: 0,
            failed: 0,
            points_expired: 0,
            interrupted: false,
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for controlling a spawned scheduler.
#[derive(Debug, Clone)]
pub struct ExpirationSchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    trigger_tx: mpsc::Sender<TickReply>,
    last_report: Arc<RwLock<Option<ExpirationReport>>>,
}

impl ExpirationSchedulerHandle {
    /// Runs a tick now and waits for its report.
    pub async fn run_now(&self) -> LedgerResult<ExpirationReport> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.trigger_tx
            .send(reply_tx)
            .await
            .map_err(|_| LedgerError::ShuttingDown)?;

        reply_rx.await.map_err(|_| LedgerError::ShuttingDown)?
    }

    /// Report of the most recent completed tick.
    pub async fn last_report(&self) -> Option<ExpirationReport> {
        self.last_report.read().await.clone()
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> LedgerResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| LedgerError::ChannelError("Shutdown channel closed".into()))
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Periodically expires points on transactions older than the window.
#[derive(Debug, Clone)]
pub struct ExpirationScheduler {
    db: Database,
    locks: UserLocks,
    retry: RetryPolicy,
    balances: BalanceStore,
    history: PointsHistoryLedger,
    window: ExpirationWindow,
    interval: Duration,
    run_on_start: bool,
    batch_size: i64,
    lease_ttl: chrono::Duration,
    holder: String,
}

impl ExpirationScheduler {
    /// Creates a scheduler from validated settings.
    pub fn new(db: Database, locks: UserLocks, config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;

        Ok(ExpirationScheduler {
            balances: BalanceStore::new(db.clone()),
            history: PointsHistoryLedger::new(db.clone()),
            db,
            locks,
            retry: config.ledger.retry.clone(),
            window: config.expiration_window(),
            interval: config.interval(),
            run_on_start: config.scheduler.run_on_start,
            batch_size: config.scheduler.batch_size,
            lease_ttl: config.lease_ttl(),
            holder: Uuid::new_v4().to_string(),
        })
    }

    /// This instance's lease holder id.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn window(&self) -> ExpirationWindow {
        self.window
    }

    /// Runs one tick at the current time.
    pub async fn run_tick(&self) -> LedgerResult<ExpirationReport> {
        self.run_tick_at(Utc::now()).await
    }

    /// Runs one tick as if the clock read `now`.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> LedgerResult<ExpirationReport> {
        self.tick(now, None).await
    }

    /// Spawns the scheduler loop.
    ///
    /// The first tick fires one interval after start unless
    /// `run_on_start` is set.
    pub fn spawn(self) -> (ExpirationSchedulerHandle, JoinHandle<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let last_report = Arc::new(RwLock::new(None));

        let handle = ExpirationSchedulerHandle {
            shutdown_tx,
            trigger_tx,
            last_report: last_report.clone(),
        };

        let task = tokio::spawn(self.run(trigger_rx, shutdown_rx, last_report));
        (handle, task)
    }

    async fn run(
        self,
        mut trigger_rx: mpsc::Receiver<TickReply>,
        mut shutdown_rx: mpsc::Receiver<()>,
        last_report: Arc<RwLock<Option<ExpirationReport>>>,
    ) {
        info!(
            window = %self.window,
            interval_secs = self.interval.as_secs(),
            holder = %self.holder,
            "Expiration scheduler starting"
        );

        let start = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let reply = tokio::select! {
                _ = interval.tick() => None,

                Some(reply) = trigger_rx.recv() => Some(reply),

                _ = shutdown_rx.recv() => {
                    info!("Expiration scheduler shutting down");
                    break;
                }
            };

            let result = self.tick(Utc::now(), Some(&mut shutdown_rx)).await;

            let interrupted = match &result {
                Ok(report) => {
                    *last_report.write().await = Some(report.clone());
                    report.interrupted
                }
                Err(e) => {
                    error!(error = %e, "Expiration tick failed");
                    false
                }
            };

            if let Some(reply) = reply {
                let _ = reply.send(result);
            }

            if interrupted {
                info!("Expiration scheduler shutting down mid-tick");
                break;
            }
        }

        info!("Expiration scheduler stopped");
    }

    async fn tick(
        &self,
        now: DateTime<Utc>,
        shutdown: Option<&mut mpsc::Receiver<()>>,
    ) -> LedgerResult<ExpirationReport> {
        let cutoff = self.window.cutoff(now)?;
        let leases = self.db.leases();

        if !leases.try_acquire(LEASE_NAME, &self.holder, self.lease_ttl).await? {
            info!("Expiration lease held by another instance, skipping tick");
            return Ok(ExpirationReport::new(now, cutoff, false));
        }

        let result = self.expire_batch(now, cutoff, shutdown).await;

        if let Err(e) = leases.release(LEASE_NAME, &self.holder).await {
            warn!(error = %e, "Failed to release expiration lease");
        }

        let report = result?;
        info!(
            cutoff = %report.cutoff,
            candidates = report.candidates,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            points = report.points_expired,
            "Expiration tick complete"
        );
        Ok(report)
    }

    async fn expire_batch(
        &self,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
        mut shutdown: Option<&mut mpsc::Receiver<()>>,
    ) -> LedgerResult<ExpirationReport> {
        let mut report = ExpirationReport::new(now, cutoff, true);
        let mut cursor = None;

        'pages: loop {
            let page = self
                .db
                .transactions()
                .find_expirable(cutoff, cursor, self.batch_size)
                .await?;

            report.candidates += page.len();

            for txn in &page {
                if let Some(rx) = shutdown.as_mut() {
                    if !matches!(rx.try_recv(), Err(TryRecvError::Empty)) {
                        report.interrupted = true;
                        break 'pages;
                    }
                }

                match self.expire_one(txn, now).await {
                    Ok(true) => {
                        report.expired += 1;
                        report.points_expired += txn.points_earned;
                    }
                    Ok(false) => {
                        debug!(transaction_id = %txn.transaction_id, "Already expired, skipping");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        error!(
                            transaction_id = %txn.transaction_id,
                            user_id = txn.user_id,
                            error = %e,
                            "Failed to expire transaction"
                        );
                        report.failed += 1;
                    }
                }
            }

            if (page.len() as i64) < self.batch_size {
                break;
            }
            cursor = page.last().map(|t| (t.transaction_date, t.id));

            // Long runs renew the lease between pages.
            let renewed = self
                .db
                .leases()
                .try_acquire(LEASE_NAME, &self.holder, self.lease_ttl)
                .await?;
            if !renewed {
                warn!("Expiration lease lost mid-tick, stopping");
                break;
            }
        }

        // Locks of users touched by this tick are dropped once idle.
        let pruned = self.locks.prune();
        if pruned > 0 {
            debug!(pruned, "Pruned idle user locks");
        }

        Ok(report)
    }

    /// Expires one transaction as its own unit of work.
    ///
    /// Returns `false` when the transaction was already expired.
    async fn expire_one(&self, txn: &Transaction, now: DateTime<Utc>) -> LedgerResult<bool> {
        let _guard = self.locks.acquire(txn.user_id).await;

        with_conflict_retry(&self.retry, "expire_transaction", || {
            self.expire_once(txn, now)
        })
        .await
    }

    async fn expire_once(&self, txn: &Transaction, now: DateTime<Utc>) -> LedgerResult<bool> {
        let mut tx = self.db.begin().await?;

        if !self.db.transactions().mark_expired(&mut tx, txn.id, now).await? {
            return Ok(false);
        }

        self.balances
            .adjust(&mut tx, txn.user_id, -txn.points_earned, 0)
            .await?;
        self.history.append(&mut tx, &expired_entry(txn, now)).await?;

        tx.commit().await.map_err(DbError::from)?;

        debug!(
            transaction_id = %txn.transaction_id,
            user_id = txn.user_id,
            points = txn.points_earned,
            "Points expired"
        );
        Ok(true)
    }
}
