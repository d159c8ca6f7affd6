//! # reward-ledger: Points Ledger Services
//!
//! Records spend transactions, redeems points and expires old ones while
//! keeping every user's running total equal to the signed sum of their
//! history.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ledger Write Paths                              │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────────┐  │
//! │  │TransactionRecorder│ │RedemptionProcessor│ │ ExpirationScheduler  │  │
//! │  │                  │  │                  │  │                      │  │
//! │  │ +points (earn)   │  │ -points (redeem) │  │ -points (expired)    │  │
//! │  └────────┬─────────┘  └────────┬─────────┘  └──────────┬───────────┘  │
//! │           │                     │                       │              │
//! │           └─────────────┬───────┴───────────────────────┘              │
//! │                         ▼                                              │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  UserLocks::acquire(user) → with_conflict_retry → BEGIN          │  │
//! │  │     BalanceStore::adjust + PointsHistoryLedger::append           │  │
//! │  │  COMMIT (or roll back everything)                                │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Invariant: points_balance.total_points == Σ points_history.points     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`balance`] - `BalanceStore`: balance reads, adjust, available points
//! - [`history`] - `PointsHistoryLedger`: paginated history, entry builders
//! - [`recorder`] - `TransactionRecorder`: spend → points
//! - [`redemption`] - `RedemptionProcessor`: points → discount
//! - [`scheduler`] - `ExpirationScheduler` background task
//! - [`ledger`] - `Ledger` facade wiring the above together
//! - [`locks`] - per-user async mutex registry
//! - [`retry`] - exponential backoff on write conflicts
//! - [`config`] - TOML + environment configuration
//! - [`error`] - `LedgerError` taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reward_core::{Money, NewTransaction};
//! use reward_ledger::{Ledger, LedgerConfig};
//!
//! let ledger = Ledger::open(LedgerConfig::load(None)?).await?;
//!
//! let txn = ledger
//!     .record(NewTransaction::new(user_id, Money::from_cents(10_000), "grocery", "MILK"))
//!     .await?;
//! let outcome = ledger.redeem(user_id, 150).await?;
//!
//! let (scheduler, _task) = ledger.scheduler()?.spawn();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod balance;
pub mod config;
pub mod error;
pub mod history;
pub mod ledger;
pub mod locks;
pub mod recorder;
pub mod redemption;
pub mod retry;
pub mod scheduler;

// =============================================================================
// Re-exports
// =============================================================================

pub use balance::BalanceStore;
pub use config::{load_multiplier_file, DatabaseSettings, LedgerConfig, LedgerSettings, SchedulerSettings};
pub use error::{LedgerError, LedgerResult};
pub use history::{HistoryPage, PointsHistoryLedger};
pub use ledger::{AuditReport, BalanceSnapshot, Ledger};
pub use locks::{UserGuard, UserLocks};
pub use recorder::TransactionRecorder;
pub use redemption::{RedemptionOutcome, RedemptionProcessor};
pub use retry::{with_conflict_retry, RetryPolicy};
pub use scheduler::{ExpirationReport, ExpirationScheduler, ExpirationSchedulerHandle, LEASE_NAME};
