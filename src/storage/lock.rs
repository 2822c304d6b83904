//! Transaction lock: a single exclusive writer token per store

use super::traits::{IsolationLevel, StorageError, StorageResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Hands out [`TransactionLock`]s, at most one active at a time.
#[derive(Debug, Default)]
pub struct LockManager {
    owner: Mutex<Option<u64>>,
    released: Condvar,
    next_id: AtomicU64,
}

impl LockManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn owner(&self) -> MutexGuard<'_, Option<u64>> {
        // the guarded value is a plain id, always consistent
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the lock is free and take it.
    ///
    /// `wait` bounds the blocking time; `None` waits indefinitely.
    pub fn acquire(
        self: &Arc<Self>,
        isolation: IsolationLevel,
        wait: Option<Duration>,
    ) -> StorageResult<TransactionLock> {
        let mut owner = self.owner();
        let deadline = wait.map(|w| Instant::now() + w);
        while owner.is_some() {
            owner = match deadline {
                None => self
                    .released
                    .wait(owner)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(StorageError::LockTimeout(wait.unwrap_or_default()));
                    }
                    self.released
                        .wait_timeout(owner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        *owner = Some(id);
        Ok(TransactionLock {
            manager: Arc::clone(self),
            id,
            isolation,
            active: true,
        })
    }

    /// True while some transaction holds the lock
    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    /// Fail unless `lock` is active and was issued by this manager
    pub fn check(self: &Arc<Self>, lock: &TransactionLock) -> StorageResult<()> {
        if lock.active && Arc::ptr_eq(self, &lock.manager) && *self.owner() == Some(lock.id) {
            Ok(())
        } else {
            Err(StorageError::LockNotHeld)
        }
    }

    fn release_id(&self, id: u64) {
        let mut owner = self.owner();
        if *owner == Some(id) {
            *owner = None;
            self.released.notify_one();
        }
    }
}

/// Exclusive ownership of a store's write path for one transaction.
///
/// Obtained from [`LockManager::acquire`]; released explicitly with
/// [`release`](Self::release) or implicitly when dropped.
#[derive(Debug)]
pub struct TransactionLock {
    manager: Arc<LockManager>,
    id: u64,
    isolation: IsolationLevel,
    active: bool,
}

impl TransactionLock {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Give the lock back. Idempotent.
    pub fn release(&mut self) {
        if self.active {
            self.active = false;
            self.manager.release_id(self.id);
        }
    }
}

impl Drop for TransactionLock {
    fn drop(&mut self) {
        self.release();
    }
}
