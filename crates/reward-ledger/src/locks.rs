//! # Per-User Locks
//!
//! In-process mutual exclusion keyed by user id.
//!
//! ```text
//!   record(u1) ──┐                       ┌── redeem(u2)
//!                ▼                       ▼
//!          ┌──────────┐            ┌──────────┐
//!          │ lock(u1) │            │ lock(u2) │   different users:
//!          └────┬─────┘            └────┬─────┘   fully parallel
//!               │                       │
//!   expire(u1) ─┤ waits                 │
//!               ▼                       ▼
//!        one SQL transaction     one SQL transaction
//! ```
//!
//! The lock orders writers for the same user inside this process. The SQL
//! transaction each writer opens under the lock is what keeps writers in
//! other processes from interleaving.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use reward_core::UserId;

/// Registry of per-user async mutexes.
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    inner: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

/// Held while a unit of work for one user runs. Dropping releases it.
#[derive(Debug)]
pub struct UserGuard {
    user_id: UserId,
    _guard: OwnedMutexGuard<()>,
}

impl UserGuard {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `user_id`.
    pub async fn acquire(&self, user_id: UserId) -> UserGuard {
        // The map entry is released before awaiting so other users' locks
        // in the same shard stay reachable.
        let lock = self
            .inner
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        UserGuard {
            user_id,
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of users with a registered lock.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drops locks nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_exclusive() {
        let locks = UserLocks::new();
        let guard = locks.acquire(1).await;
        assert_eq!(guard.user_id(), 1);

        let contender = locks.clone();
        let waiting = tokio::spawn(async move { contender.acquire(1).await.user_id() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        assert_eq!(waiting.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.acquire(1).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = UserLocks::new();
        let held = locks.acquire(1).await;
        drop(locks.acquire(2).await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
