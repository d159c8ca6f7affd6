//! # Storage Errors
//!
//! What can go wrong below the ledger, sorted by how the ledger reacts.
//!
//! ```text
//!   sqlx::Error
//!     │
//!     ├── UNIQUE / FOREIGN KEY failed ─► UniqueViolation / ForeignKeyViolation
//!     ├── SQLITE_BUSY / LOCKED ───────► Conflict        ┐ is_retryable()
//!     ├── PoolTimedOut ───────────────► PoolExhausted   ┘ → backoff + rerun
//!     ├── RowNotFound ────────────────► NotFound
//!     └── anything else ──────────────► QueryFailed / ConnectionFailed / Internal
//! ```

use thiserror::Error;

/// Storage failure reported by a repository.
#[derive(Debug, Error)]
pub enum DbError {
    /// A lookup by id matched nothing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A second user with the same email, or a reused idempotency key.
    #[error("{field} '{value}' is already taken")]
    UniqueViolation { field: String, value: String },

    /// A transaction, balance or history row named a user that does not exist.
    #[error("Unknown referenced row: {message}")]
    ForeignKeyViolation { message: String },

    /// The database was busy or locked by a concurrent writer.
    ///
    /// Safe to retry: the statement had no effect.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Opening the file or the pool failed, or the pool is closed.
    #[error("Cannot reach ledger database: {0}")]
    ConnectionFailed(String),

    #[error("Schema migration failed: {0}")]
    MigrationFailed(String),

    /// Any other statement error.
    #[error("Statement failed: {0}")]
    QueryFailed(String),

    /// No connection became free within the acquire timeout.
    #[error("Timed out waiting for a database connection")]
    PoolExhausted,

    #[error("Unexpected storage error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True when repeating the same unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Conflict(_) | DbError::PoolExhausted)
    }
}

/// SQLite primary and extended result codes that mean "try again".
///
/// 5 = BUSY, 6 = LOCKED, 261 = BUSY_RECOVERY, 262 = LOCKED_SHAREDCACHE,
/// 517 = BUSY_SNAPSHOT.
const BUSY_CODES: [&str; 5] = ["5", "6", "261", "262", "517"];

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message();
                let busy_code = db_err
                    .code()
                    .map(|code| BUSY_CODES.contains(&code.as_ref()))
                    .unwrap_or(false);

                // SQLite reports the column as "UNIQUE constraint failed: table.column"
                if let Some(column) = message.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::duplicate(column, "?")
                } else if message.starts_with("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: message.to_string(),
                    }
                } else if busy_code || message.contains("is locked") {
                    DbError::Conflict(message.to_string())
                } else {
                    DbError::QueryFailed(message.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DbError::Conflict("database is locked".into()).is_retryable());
        assert!(DbError::PoolExhausted.is_retryable());
        assert!(!DbError::not_found("User", 1).is_retryable());
        assert!(!DbError::QueryFailed("syntax".into()).is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_pool_errors() {
        assert!(matches!(
            DbError::from(sqlx::Error::PoolTimedOut),
            DbError::PoolExhausted
        ));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::ConnectionFailed(_)
        ));
    }
}
