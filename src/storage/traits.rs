//! Storage trait definitions

use super::lock::TransactionLock;
use crate::model::{Statement, StatementPattern, Term, TermError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transaction lock is not held by the caller")]
    LockNotHeld,

    #[error("Timed out after {0:?} waiting for the transaction lock")]
    LockTimeout(Duration),

    #[error("No active transaction for this lock")]
    NoTransaction,

    #[error("Corrupt stored term: {0}")]
    Corrupt(String),

    #[error("Cannot store statement: {0}")]
    InvalidTerm(#[from] TermError),

    #[error("Store state poisoned: {0}")]
    Poisoned(&'static str),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Isolation level requested when taking the transaction lock
///
/// Every level maps onto the store's single writer lock; the level is
/// recorded on the lock for engines that distinguish read behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    None,
    ReadCommitted,
    SnapshotRead,
    #[default]
    Snapshot,
    Serializable,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::ReadCommitted => "read_committed",
            Self::SnapshotRead => "snapshot_read",
            Self::Snapshot => "snapshot",
            Self::Serializable => "serializable",
        };
        f.write_str(name)
    }
}

/// Trait for triple store engines
///
/// Writes happen inside a transaction: take the lock with
/// `transaction_lock()`, call `begin()`, mutate, then `commit()` or
/// `rollback()`. Every mutating call takes the lock as proof of ownership
/// and fails with [`StorageError::LockNotHeld`] for an inactive or foreign
/// lock. Mutations are buffered and only become visible to readers on commit.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait TripleStore: Send + Sync {
    /// Whether the store accepts write transactions
    fn is_writable(&self) -> bool;

    /// Take the store's transaction lock, blocking until it is free.
    ///
    /// With `wait` set, gives up after that long with
    /// [`StorageError::LockTimeout`].
    fn transaction_lock(
        &self,
        isolation: IsolationLevel,
        wait: Option<Duration>,
    ) -> StorageResult<TransactionLock>;

    // === Transaction bookkeeping ===

    /// Open a transaction for the holder of `lock`
    fn begin(&self, lock: &TransactionLock) -> StorageResult<()>;

    /// Atomically apply everything buffered since `begin()`
    fn commit(&self, lock: &TransactionLock) -> StorageResult<()>;

    /// Discard everything buffered since `begin()`
    fn rollback(&self, lock: &TransactionLock) -> StorageResult<()>;

    // === Mutations (buffered) ===

    /// Add a statement, once per graph in `contexts` (or in its own graph
    /// when `contexts` is empty).
    ///
    /// Every copy is checked with [`Statement::validate`] before any is
    /// buffered; a bad term fails with [`StorageError::InvalidTerm`].
    fn add_statement(
        &self,
        lock: &TransactionLock,
        statement: &Statement,
        contexts: &[Term],
        inferred: bool,
    ) -> StorageResult<()>;

    /// Remove every statement matching `pattern`
    fn remove_statements(
        &self,
        lock: &TransactionLock,
        pattern: &StatementPattern,
        inferred: bool,
    ) -> StorageResult<()>;

    /// Remove every statement in `contexts`, or all statements when empty
    fn clear(&self, lock: &TransactionLock, contexts: &[Term], inferred: bool)
        -> StorageResult<()>;

    // === Reads (committed state only) ===

    /// Committed statements matching `pattern`
    fn statements(
        &self,
        pattern: &StatementPattern,
        include_inferred: bool,
    ) -> StorageResult<Vec<Statement>>;

    /// Number of committed statements, asserted and inferred
    fn len(&self) -> StorageResult<usize>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Distinct named graphs holding at least one statement
    fn contexts(&self) -> StorageResult<Vec<Term>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: TripleStore + Sized {
    /// Open or create a writable store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Open an existing store without write access
    fn open_read_only(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
