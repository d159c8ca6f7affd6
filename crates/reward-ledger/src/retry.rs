//! # Conflict Retry
//!
//! Re-runs a unit of work that lost a race for SQLite's write lock.
//!
//! ```text
//!   attempt ──► Ok / domain error ─────────────────────► return
//!      │
//!      └──► Conflict ──► backoff.next_backoff()
//!                           ├── Some(d) → sleep(d), attempt again
//!                           └── None    → return Conflict
//! ```
//!
//! Every unit of work rolls back on error, so re-running it from the top
//! is always safe.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};

/// Exponential backoff settings for write conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// First delay (milliseconds).
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Longest single delay (milliseconds).
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_ms() -> u64 {
    20
}

fn default_max_ms() -> u64 {
    1_000
}

fn default_max_attempts() -> u32 {
    8
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.max_attempts == 0 {
            return Err(LedgerError::InvalidConfig(
                "ledger.retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.initial_ms > self.max_ms {
            return Err(LedgerError::InvalidConfig(
                "ledger.retry.initial_ms must not exceed max_ms".into(),
            ));
        }
        Ok(())
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_ms),
            max_interval: Duration::from_millis(self.max_ms),
            multiplier: 2.0,
            max_elapsed_time: None, // bounded by max_attempts instead
            ..Default::default()
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
pub async fn with_conflict_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 1u32;

    loop {
        match op().await {
            Err(err) if err.is_retryable() => {
                if attempt >= policy.max_attempts {
                    warn!(operation, attempt, error = %err, "Giving up after write conflicts");
                    return Err(err);
                }

                match backoff.next_backoff() {
                    Some(delay) => {
                        debug!(operation, attempt, ?delay, "Write conflict, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                }
            }
            other => return other,
        }
    }
}
