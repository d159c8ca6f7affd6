//! # Ledger Error Types
//!
//! The error taxonomy every ledger operation reports in.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Ledger Error Categories                            │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────────┐  │
//! │  │  Domain          │  │  Transient       │  │  Infrastructure      │  │
//! │  │  (terminal)      │  │  (retried)       │  │  (surfaced, logged)  │  │
//! │  │                  │  │                  │  │                      │  │
//! │  │  Validation      │  │  Conflict        │  │  Infrastructure      │  │
//! │  │  UserNotFound    │  │                  │  │                      │  │
//! │  │  BalanceNotFound │  │                  │  │                      │  │
//! │  │  InsufficientPts │  │                  │  │                      │  │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────────┘  │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐                            │
//! │  │  Configuration   │  │  Lifecycle       │                            │
//! │  │  InvalidConfig   │  │  ShuttingDown    │                            │
//! │  │  ConfigLoad/Save │  │  ChannelError    │                            │
//! │  └──────────────────┘  └──────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `Conflict` is retried inside the ledger with exponential backoff and
//! only reaches the caller once the retry budget is spent.

use thiserror::Error;

use reward_core::{CoreError, UserId, ValidationError};
use reward_db::DbError;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error type.
#[derive(Debug, Error)]
pub enum LedgerError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Malformed or out-of-range input.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The referenced user does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// The user has no balance row yet. Equivalent to a zero balance.
    #[error("No points balance for user {0}")]
    BalanceNotFound(UserId),

    /// Redemption asked for more than the user can redeem.
    #[error("Insufficient points: requested {requested}, available {available} (short by {shortfall})")]
    InsufficientPoints {
        user_id: UserId,
        requested: i64,
        available: i64,
        shortfall: i64,
    },

    // =========================================================================
    // Transient Errors
    // =========================================================================
    /// Another writer held the user's row or the database write lock.
    #[error("Write conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Storage failed. Nothing from the failed unit of work was applied.
    #[error("Storage error: {0}")]
    Infrastructure(DbError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse a config or multiplier file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to write a config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The scheduler is shutting down.
    #[error("Expiration scheduler is shutting down")]
    ShuttingDown,

    /// A control channel to a background task is closed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        if err.is_retryable() {
            LedgerError::Conflict(err.to_string())
        } else {
            LedgerError::Infrastructure(err)
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => LedgerError::Validation(v),
            other => LedgerError::InvalidConfig(other.to_string()),
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for LedgerError {
    fn from(err: toml::ser::Error) -> Self {
        LedgerError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl LedgerError {
    /// Creates an InsufficientPoints error, computing the shortfall.
    pub fn insufficient(user_id: UserId, requested: i64, available: i64) -> Self {
        LedgerError::InsufficientPoints {
            user_id,
            requested,
            available,
            shortfall: requested - available,
        }
    }

    /// Returns true if repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }

    /// Returns true for errors caused by the request itself.
    ///
    /// These are terminal and returned to the caller unchanged.
    pub fn is_domain_error(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_)
                | LedgerError::UserNotFound(_)
                | LedgerError::BalanceNotFound(_)
                | LedgerError::InsufficientPoints { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidConfig(_)
                | LedgerError::ConfigLoadFailed(_)
                | LedgerError::ConfigSaveFailed(_)
        )
    }
}
