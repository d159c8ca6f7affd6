//! # reward-core: Pure Business Logic for the Reward Ledger
//!
//! This crate holds the points arithmetic and the domain types shared by
//! the database layer and the ledger services. It performs no I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Reward Ledger Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        HTTP / auth collaborators (outside this workspace)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ domain requests                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     reward-ledger (Recorder, Redemption, Expiration)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ reward-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐  │   │
//! │  │   │   types   │  │   money    │  │ multiplier │  │expiration│  │   │
//! │  │   │Transaction│  │   Money    │  │   Table    │  │  Window  │  │   │
//! │  │   │  History  │  │ whole units│  │ default 1  │  │  cutoff  │  │   │
//! │  │   └───────────┘  └────────────┘  └────────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   reward-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Transaction, PointsBalance, PointsHistoryEntry)
//! - [`money`] - Integer-cent money type
//! - [`multiplier`] - Category → multiplier lookup
//! - [`expiration`] - Calendar-aware expiration windows
//! - [`validation`] - Input re-checks and page normalisation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use reward_core::{Money, MultiplierTable};
//!
//! let table = MultiplierTable::from_entries([("grocery", 2), ("electronics", 3)]).unwrap();
//!
//! // $100.99 floors to 100 whole units, times the grocery multiplier
//! assert_eq!(table.points_for(Money::from_cents(10_099), "grocery"), Ok(200));
//! // Unknown categories earn at the default multiplier
//! assert_eq!(table.points_for(Money::from_cents(10_000), "garden"), Ok(100));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod expiration;
pub mod money;
pub mod multiplier;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use expiration::ExpirationWindow;
pub use money::Money;
pub use multiplier::MultiplierTable;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Multiplier applied to categories absent from the table.
pub const DEFAULT_MULTIPLIER: i64 = 1;

/// Page size used when a caller supplies none or a non-positive one.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound for a single history page.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Length of the trailing window, in months, whose earn entries count as
/// redeemable.
pub const AVAILABILITY_WINDOW_MONTHS: u32 = 12;
