//! # reward-db: Database Layer for the Reward Ledger
//!
//! SQLite storage for users, transactions, balances, points history and
//! the scheduler lease, accessed asynchronously through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Reward Ledger Data Flow                          │
//! │                                                                         │
//! │  reward-ledger (recorder / redemption / scheduler)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     reward-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────────┐  ┌─────────────┐  │   │
//! │  │   │   Database    │    │   Repositories    │  │ Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                   │  │ (embedded)  │  │   │
//! │  │   │               │    │ UserRepository    │  │             │  │   │
//! │  │   │ SqlitePool    │◄───│ TransactionRepo   │  │ 001_initial │  │   │
//! │  │   │ begin()       │    │ BalanceRepository │  │             │  │   │
//! │  │   │               │    │ HistoryRepository │  │             │  │   │
//! │  │   │               │    │ LeaseRepository   │  │             │  │   │
//! │  │   └───────────────┘    └───────────────────┘  └─────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reward_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("rewards.db")).await?;
//! let balance = db.balances().get(user_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};

pub use repository::balance::BalanceRepository;
pub use repository::history::{HistoryRepository, NewHistoryEntry};
pub use repository::lease::{Lease, LeaseRepository};
pub use repository::transaction::{InsertTransaction, TransactionRepository};
pub use repository::user::UserRepository;

/// Re-exported so callers can name transaction handles without a direct
/// sqlx dependency.
pub use sqlx::{Sqlite, SqliteConnection, Transaction as SqlTransaction};
