//! # Repository Module
//!
//! Database repository implementations for the reward ledger.
//!
//! ## Read vs Unit-of-Work Access
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Standalone reads              Unit of work (record / redeem / expire) │
//! │  ────────────────              ─────────────────────────────────────── │
//! │  db.history().query(&q)        let mut tx = db.begin().await?;         │
//! │  db.balances().get(id)         db.balances().adjust(&mut tx, ..)       │
//! │       │                        db.history().append(&mut tx, ..)        │
//! │       │                        tx.commit().await?;                     │
//! │       ▼                                 │                               │
//! │  any pooled connection                  ▼                               │
//! │                                the transaction's connection only       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods that take `&mut SqliteConnection` never commit; the caller
//! owns the transaction boundary. Methods generic over an executor can
//! run either way.
//!
//! ## Available Repositories
//!
//! - [`UserRepository`](user::UserRepository) - Ledger participants
//! - [`TransactionRepository`](transaction::TransactionRepository) - Recorded spends and expiry marks
//! - [`BalanceRepository`](balance::BalanceRepository) - Denormalized running totals
//! - [`HistoryRepository`](history::HistoryRepository) - Append-only point movements
//! - [`LeaseRepository`](lease::LeaseRepository) - Single-holder scheduler lease

pub mod balance;
pub mod history;
pub mod lease;
pub mod transaction;
pub mod user;
