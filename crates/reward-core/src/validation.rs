//! # Validation Module
//!
//! Re-checks of inputs the request layer has already shape-validated.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request collaborator                                         │
//! │  └── JSON shape, required fields                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  └── positive amounts, non-empty category / product code               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── Foreign key to users                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{NewTransaction, UserId};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted category or product code.
pub const MAX_LABEL_LEN: usize = 100;

/// Validates a user id.
pub fn validate_user_id(user_id: UserId) -> ValidationResult<()> {
    if user_id <= 0 {
        return Err(ValidationError::must_be_positive("user_id"));
    }
    Ok(())
}

/// Validates a non-empty, bounded label such as a category or product code.
pub fn validate_label(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > MAX_LABEL_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_LABEL_LEN,
        });
    }

    Ok(())
}

/// Validates a transaction before it is recorded.
///
/// ## Rules
/// - `user_id` must be positive
/// - `amount` must be greater than zero
/// - `category` and `product_code` must be non-empty
///
/// ## Example
/// ```rust
/// use reward_core::{Money, NewTransaction};
/// use reward_core::validation::validate_new_transaction;
///
/// let ok = NewTransaction::new(1, Money::from_cents(500), "grocery", "SKU-1");
/// assert!(validate_new_transaction(&ok).is_ok());
///
/// let free = NewTransaction::new(1, Money::zero(), "grocery", "SKU-1");
/// assert!(validate_new_transaction(&free).is_err());
/// ```
pub fn validate_new_transaction(txn: &NewTransaction) -> ValidationResult<()> {
    validate_user_id(txn.user_id)?;

    if !txn.amount.is_positive() {
        return Err(ValidationError::must_be_positive("amount"));
    }

    validate_label("category", &txn.category)?;
    validate_label("product_code", &txn.product_code)?;

    Ok(())
}

/// Validates a redemption request amount.
pub fn validate_points_to_redeem(points: i64) -> ValidationResult<()> {
    if points <= 0 {
        return Err(ValidationError::must_be_positive("points_to_redeem"));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
