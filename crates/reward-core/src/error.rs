//! # Domain Errors
//!
//! Failures the pure domain layer can report.
//!
//! ```text
//!   ValidationError ──► CoreError::Validation ──┐
//!   bad multiplier  ──► CoreError::Invalid*   ──┼──► LedgerError (reward-ledger)
//!   bad window      ──► CoreError::InvalidWindow┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Configuration or input problems found without touching storage.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A multiplier table entry is not a positive integer.
    ///
    /// ## When This Occurs
    /// - The multiplier file maps a category to 0 or a negative number
    #[error("Multiplier for category '{category}' must be positive, got {multiplier}")]
    InvalidMultiplier { category: String, multiplier: i64 },

    /// The multiplier source could not be parsed.
    #[error("Invalid multiplier table: {0}")]
    MultiplierParse(String),

    /// The expiration window cannot produce a cutoff.
    ///
    /// ## When This Occurs
    /// - All three components are zero
    /// - The subtraction falls outside chrono's representable range
    #[error("Invalid expiration window: {0}")]
    InvalidWindow(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Collaborators validate request shape before calling the ledger; these
/// re-checks catch anything that slipped through.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unparsable amount, unknown kind).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates a `Required` error for the given field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Creates a `MustBePositive` error for the given field.
    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
