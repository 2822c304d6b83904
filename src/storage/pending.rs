//! Per-transaction mutation buffer shared by the store engines

use super::lock::{LockManager, TransactionLock};
use super::traits::{StorageError, StorageResult};
use crate::model::{Statement, StatementPattern, Term};
use std::sync::{Arc, Mutex};

/// One buffered mutation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingOp {
    Add { statement: Statement, inferred: bool },
    Remove { pattern: StatementPattern, inferred: bool },
    Clear { contexts: Vec<Term>, inferred: bool },
}

#[derive(Debug)]
struct OpenTxn {
    lock_id: u64,
    ops: Vec<PendingOp>,
}

/// Buffers the mutations of the transaction currently holding the lock.
#[derive(Debug)]
pub(crate) struct TxnBuffer {
    locks: Arc<LockManager>,
    open: Mutex<Option<OpenTxn>>,
}

impl TxnBuffer {
    pub(crate) fn new(locks: Arc<LockManager>) -> Self {
        Self {
            locks,
            open: Mutex::new(None),
        }
    }

    pub(crate) fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Start buffering for `lock`.
    ///
    /// A buffer left behind by an earlier lock holder is discarded: its
    /// lock is gone, so its mutations can never be committed.
    pub(crate) fn begin(&self, lock: &TransactionLock) -> StorageResult<()> {
        self.locks.check(lock)?;
        let mut open = self
            .open
            .lock()
            .map_err(|_| StorageError::Poisoned("transaction buffer"))?;
        if let Some(stale) = open.as_ref() {
            if stale.lock_id != lock.id() {
                tracing::warn!(
                    stale_lock = stale.lock_id,
                    pending = stale.ops.len(),
                    "discarding mutations of an abandoned transaction"
                );
            }
        }
        *open = Some(OpenTxn {
            lock_id: lock.id(),
            ops: Vec::new(),
        });
        Ok(())
    }

    pub(crate) fn push(&self, lock: &TransactionLock, op: PendingOp) -> StorageResult<()> {
        self.locks.check(lock)?;
        let mut open = self
            .open
            .lock()
            .map_err(|_| StorageError::Poisoned("transaction buffer"))?;
        match open.as_mut() {
            Some(txn) if txn.lock_id == lock.id() => {
                txn.ops.push(op);
                Ok(())
            }
            _ => Err(StorageError::NoTransaction),
        }
    }

    /// Close the transaction and hand back its mutations in order
    pub(crate) fn take(&self, lock: &TransactionLock) -> StorageResult<Vec<PendingOp>> {
        self.locks.check(lock)?;
        let mut open = self
            .open
            .lock()
            .map_err(|_| StorageError::Poisoned("transaction buffer"))?;
        match open.take() {
            Some(txn) if txn.lock_id == lock.id() => Ok(txn.ops),
            other => {
                *open = other;
                Err(StorageError::NoTransaction)
            }
        }
    }
}
