//! StoreConnection: lock-disciplined transactions over a store engine
//!
//! A connection is `Idle` until `begin()` hands out a [`Transaction`]. The
//! transaction owns the store's [`TransactionLock`] for its whole lifetime
//! and gives it back on every way out: commit, rollback, a failed begin, or
//! being dropped. Each successful commit fires exactly one change
//! notification; rollbacks fire none. Either way the connection starts the
//! next transaction with a fresh [`ChangeEvent`].

use super::change::{ChangeEvent, ChangeNotifier};
use super::{ConnectorError, ConnectorResult};
use crate::model::{Statement, StatementPattern, Term};
use crate::storage::{IsolationLevel, TransactionLock, TripleStore};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    TransactionActive,
    Committing,
    RollingBack,
}

/// A single writer's view of a store.
pub struct StoreConnection<S: TripleStore + ?Sized> {
    store: Arc<S>,
    notifier: Arc<ChangeNotifier>,
    isolation: IsolationLevel,
    lock_wait: Option<Duration>,
    state: ConnectionState,
    change: ChangeEvent,
}

impl<S: TripleStore + ?Sized> StoreConnection<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            notifier: ChangeNotifier::new(),
            isolation: IsolationLevel::default(),
            lock_wait: None,
            state: ConnectionState::Idle,
            change: ChangeEvent::new(),
        }
    }

    /// Share a notifier with other connections
    pub fn with_notifier(mut self, notifier: Arc<ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.set_isolation(isolation);
        self
    }

    /// Bound how long `begin()` waits for the lock; `None` waits forever
    pub fn with_lock_wait(mut self, wait: Option<Duration>) -> Self {
        self.set_lock_wait(wait);
        self
    }

    pub fn set_isolation(&mut self, isolation: IsolationLevel) {
        self.isolation = isolation;
    }

    pub fn set_lock_wait(&mut self, wait: Option<Duration>) {
        self.lock_wait = wait;
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Flags accumulated by the current (or next) transaction
    pub fn pending_change(&self) -> ChangeEvent {
        self.change
    }

    /// Start a write transaction.
    ///
    /// Fails with [`ConnectorError::ReadOnly`] without touching the lock when
    /// the store is not writable. If the store's begin bookkeeping fails, the
    /// lock just taken is released before the error is returned.
    pub fn begin(&mut self) -> ConnectorResult<Transaction<'_, S>> {
        if !self.store.is_writable() {
            return Err(ConnectorError::ReadOnly);
        }

        let mut lock = self.store.transaction_lock(self.isolation, self.lock_wait)?;
        if let Err(e) = self.store.begin(&lock) {
            lock.release();
            tracing::error!(error = %e, "failed to begin transaction");
            return Err(e.into());
        }

        tracing::trace!(lock = lock.id(), isolation = %lock.isolation(), "transaction started");
        self.state = ConnectionState::TransactionActive;
        Ok(Transaction {
            conn: self,
            lock,
            finished: false,
        })
    }

    /// Close out a transaction: release the lock and start a fresh change event
    fn finish(&mut self, lock: &mut TransactionLock) -> ChangeEvent {
        lock.release();
        self.state = ConnectionState::Idle;
        std::mem::take(&mut self.change)
    }
}

impl<S: TripleStore + ?Sized> std::fmt::Debug for StoreConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConnection")
            .field("isolation", &self.isolation)
            .field("lock_wait", &self.lock_wait)
            .field("state", &self.state)
            .field("change", &self.change)
            .finish()
    }
}

/// An active write transaction.
///
/// Owns the transaction lock; consumed by [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Dropping it uncommitted rolls back.
pub struct Transaction<'c, S: TripleStore + ?Sized> {
    conn: &'c mut StoreConnection<S>,
    lock: TransactionLock,
    finished: bool,
}

impl<'c, S: TripleStore + ?Sized> Transaction<'c, S> {
    pub fn lock(&self) -> &TransactionLock {
        &self.lock
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state
    }

    /// Flags accumulated so far
    pub fn change(&self) -> ChangeEvent {
        self.conn.change
    }

    pub fn add_statement(&mut self, statement: &Statement, contexts: &[Term]) -> ConnectorResult<()> {
        self.conn
            .store
            .add_statement(&self.lock, statement, contexts, false)?;
        self.conn.change.set_statements_added();
        Ok(())
    }

    pub fn add_inferred_statement(
        &mut self,
        statement: &Statement,
        contexts: &[Term],
    ) -> ConnectorResult<()> {
        self.conn
            .store
            .add_statement(&self.lock, statement, contexts, true)?;
        self.conn.change.set_statements_added();
        Ok(())
    }

    pub fn remove_statements(&mut self, pattern: &StatementPattern) -> ConnectorResult<()> {
        self.conn.store.remove_statements(&self.lock, pattern, false)?;
        self.conn.change.set_statements_removed();
        Ok(())
    }

    pub fn remove_inferred_statements(&mut self, pattern: &StatementPattern) -> ConnectorResult<()> {
        self.conn.store.remove_statements(&self.lock, pattern, true)?;
        self.conn.change.set_statements_removed();
        Ok(())
    }

    /// Remove all statements in `contexts`, or everything when empty
    pub fn clear(&mut self, contexts: &[Term]) -> ConnectorResult<()> {
        self.conn.store.clear(&self.lock, contexts, false)?;
        self.conn.change.set_statements_removed();
        Ok(())
    }

    pub fn clear_inferred(&mut self, contexts: &[Term]) -> ConnectorResult<()> {
        self.conn.store.clear(&self.lock, contexts, true)?;
        self.conn.change.set_statements_removed();
        Ok(())
    }

    /// Commit, release the lock and notify.
    ///
    /// The lock is released and the change event reset whether or not the
    /// store commit succeeds; only a successful commit notifies. Returns
    /// the event that was published.
    pub fn commit(mut self) -> ConnectorResult<ChangeEvent> {
        self.finished = true;
        self.conn.state = ConnectionState::Committing;
        let result = self.conn.store.commit(&self.lock);
        let event = self.conn.finish(&mut self.lock);

        match result {
            Ok(()) => {
                self.conn.notifier.notify(event);
                Ok(event)
            }
            Err(e) => {
                tracing::error!(error = %e, "commit failed");
                Err(e.into())
            }
        }
    }

    /// Discard pending mutations and release the lock. Never notifies.
    pub fn rollback(mut self) -> ConnectorResult<()> {
        self.finished = true;
        self.abort().map_err(|e| {
            tracing::error!(error = %e, "rollback failed");
            ConnectorError::from(e)
        })
    }

    fn abort(&mut self) -> crate::storage::StorageResult<()> {
        self.conn.state = ConnectionState::RollingBack;
        let result = self.conn.store.rollback(&self.lock);
        self.conn.finish(&mut self.lock);
        result
    }
}

impl<'c, S: TripleStore + ?Sized> std::fmt::Debug for Transaction<'c, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("lock", &self.lock)
            .field("state", &self.conn.state)
            .field("change", &self.conn.change)
            .finish()
    }
}

impl<'c, S: TripleStore + ?Sized> Drop for Transaction<'c, S> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(lock = self.lock.id(), "transaction dropped without commit, rolling back");
            if let Err(e) = self.abort() {
                tracing::error!(error = %e, "rollback of dropped transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::change::RecordingSink;
    use crate::storage::{MemoryStore, StorageError, StorageResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn st(s: &str) -> Statement {
        Statement::new(Term::iri(s), Term::iri("urn:p"), Term::iri("urn:o"))
    }

    fn connection() -> (StoreConnection<MemoryStore>, Arc<MemoryStore>, Arc<RecordingSink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = RecordingSink::new();
        let conn = StoreConnection::new(store.clone());
        conn.notifier().subscribe(sink.clone());
        (conn, store, sink)
    }

    /// Memory store whose bookkeeping can be made to fail
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_begin: AtomicBool,
        fail_commit: AtomicBool,
        fail_rollback: AtomicBool,
    }

    impl TripleStore for FailingStore {
        fn is_writable(&self) -> bool {
            self.inner.is_writable()
        }
        fn transaction_lock(
            &self,
            isolation: IsolationLevel,
            wait: Option<Duration>,
        ) -> StorageResult<TransactionLock> {
            self.inner.transaction_lock(isolation, wait)
        }
        fn begin(&self, lock: &TransactionLock) -> StorageResult<()> {
            if self.fail_begin.load(Ordering::SeqCst) {
                return Err(StorageError::Poisoned("begin"));
            }
            self.inner.begin(lock)
        }
        fn commit(&self, lock: &TransactionLock) -> StorageResult<()> {
            if self.fail_commit.load(Ordering::SeqCst) {
                self.inner.rollback(lock)?;
                return Err(StorageError::Poisoned("commit"));
            }
            self.inner.commit(lock)
        }
        fn rollback(&self, lock: &TransactionLock) -> StorageResult<()> {
            if self.fail_rollback.load(Ordering::SeqCst) {
                return Err(StorageError::Poisoned("rollback"));
            }
            self.inner.rollback(lock)
        }
        fn add_statement(
            &self,
            lock: &TransactionLock,
            statement: &Statement,
            contexts: &[Term],
            inferred: bool,
        ) -> StorageResult<()> {
            self.inner.add_statement(lock, statement, contexts, inferred)
        }
        fn remove_statements(
            &self,
            lock: &TransactionLock,
            pattern: &StatementPattern,
            inferred: bool,
        ) -> StorageResult<()> {
            self.inner.remove_statements(lock, pattern, inferred)
        }
        fn clear(&self, lock: &TransactionLock, contexts: &[Term], inferred: bool) -> StorageResult<()> {
            self.inner.clear(lock, contexts, inferred)
        }
        fn statements(
            &self,
            pattern: &StatementPattern,
            include_inferred: bool,
        ) -> StorageResult<Vec<Statement>> {
            self.inner.statements(pattern, include_inferred)
        }
        fn len(&self) -> StorageResult<usize> {
            self.inner.len()
        }
        fn contexts(&self) -> StorageResult<Vec<Term>> {
            self.inner.contexts()
        }
    }

    #[test]
    fn commit_notifies_once_and_releases_lock() {
        let (mut conn, store, sink) = connection();

        let mut txn = conn.begin().unwrap();
        assert_eq!(txn.state(), ConnectionState::TransactionActive);
        assert!(store.is_locked());
        txn.add_statement(&st("urn:a"), &[]).unwrap();
        txn.add_statement(&st("urn:b"), &[]).unwrap();
        let event = txn.commit().unwrap();

        assert_eq!(event, ChangeEvent::with_flags(true, false));
        assert_eq!(sink.events(), vec![event]);
        assert!(!store.is_locked());
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(conn.pending_change(), ChangeEvent::new());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn flags_reflect_union_of_mutations() {
        let (mut conn, _store, sink) = connection();

        let mut txn = conn.begin().unwrap();
        txn.add_statement(&st("urn:a"), &[]).unwrap();
        txn.remove_statements(&StatementPattern::any().with_subject(Term::iri("urn:zz")))
            .unwrap();
        txn.commit().unwrap();

        // a remove-only transaction does not inherit the earlier "added" flag
        let mut txn = conn.begin().unwrap();
        txn.clear(&[]).unwrap();
        txn.commit().unwrap();

        assert_eq!(
            sink.events(),
            vec![
                ChangeEvent::with_flags(true, true),
                ChangeEvent::with_flags(false, true)
            ]
        );
    }

    #[test]
    fn inferred_variants_set_the_same_flags() {
        let (mut conn, store, sink) = connection();

        let mut txn = conn.begin().unwrap();
        txn.add_inferred_statement(&st("urn:a"), &[]).unwrap();
        txn.commit().unwrap();

        let mut txn = conn.begin().unwrap();
        txn.remove_inferred_statements(&StatementPattern::any()).unwrap();
        txn.clear_inferred(&[]).unwrap();
        txn.commit().unwrap();

        assert_eq!(
            sink.events(),
            vec![
                ChangeEvent::with_flags(true, false),
                ChangeEvent::with_flags(false, true)
            ]
        );
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn empty_commit_still_notifies_once() {
        let (mut conn, _store, sink) = connection();
        conn.begin().unwrap().commit().unwrap();
        assert_eq!(sink.events(), vec![ChangeEvent::new()]);
    }

    #[test]
    fn rollback_never_notifies_and_resets_flags() {
        let (mut conn, store, sink) = connection();

        let mut txn = conn.begin().unwrap();
        txn.add_statement(&st("urn:a"), &[]).unwrap();
        assert!(txn.change().statements_added());
        txn.rollback().unwrap();

        assert!(sink.is_empty());
        assert!(!store.is_locked());
        assert_eq!(conn.pending_change(), ChangeEvent::new());
        assert!(store.is_empty().unwrap());

        // next commit reports only its own work
        let mut txn = conn.begin().unwrap();
        txn.remove_statements(&StatementPattern::any()).unwrap();
        txn.commit().unwrap();
        assert_eq!(sink.events(), vec![ChangeEvent::with_flags(false, true)]);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let (mut conn, store, sink) = connection();
        {
            let mut txn = conn.begin().unwrap();
            txn.add_statement(&st("urn:a"), &[]).unwrap();
        }
        assert!(!store.is_locked());
        assert!(store.is_empty().unwrap());
        assert!(sink.is_empty());
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(conn.pending_change(), ChangeEvent::new());
    }

    #[test]
    fn begin_on_read_only_store_takes_no_lock() {
        let (mut conn, store, _sink) = connection();
        store.set_writable(false);

        let err = conn.begin().unwrap_err();
        assert!(matches!(err, ConnectorError::ReadOnly));
        assert!(!store.is_locked());
        assert_eq!(conn.state(), ConnectionState::Idle);

        store.set_writable(true);
        assert!(conn.begin().is_ok());
    }

    #[test]
    fn failed_begin_releases_lock() {
        let store = Arc::new(FailingStore::default());
        store.fail_begin.store(true, Ordering::SeqCst);
        let mut conn = StoreConnection::new(store.clone());

        assert!(matches!(conn.begin(), Err(ConnectorError::Store(_))));
        assert!(!store.inner.is_locked());
        assert_eq!(conn.state(), ConnectionState::Idle);

        store.fail_begin.store(false, Ordering::SeqCst);
        conn.begin().unwrap().commit().unwrap();
    }

    #[test]
    fn failed_commit_releases_lock_and_skips_notification() {
        let store = Arc::new(FailingStore::default());
        let sink = RecordingSink::new();
        let mut conn = StoreConnection::new(store.clone());
        conn.notifier().subscribe(sink.clone());

        store.fail_commit.store(true, Ordering::SeqCst);
        let mut txn = conn.begin().unwrap();
        txn.add_statement(&st("urn:a"), &[]).unwrap();
        assert!(matches!(txn.commit(), Err(ConnectorError::Store(_))));

        assert!(!store.inner.is_locked());
        assert!(sink.is_empty());
        assert_eq!(conn.pending_change(), ChangeEvent::new());
        assert!(store.is_empty().unwrap());

        store.fail_commit.store(false, Ordering::SeqCst);
        let mut txn = conn.begin().unwrap();
        txn.add_statement(&st("urn:b"), &[]).unwrap();
        txn.commit().unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn failed_rollback_still_releases_lock() {
        let store = Arc::new(FailingStore::default());
        store.fail_rollback.store(true, Ordering::SeqCst);
        let mut conn = StoreConnection::new(store.clone());

        let txn = conn.begin().unwrap();
        assert!(txn.rollback().is_err());
        assert!(!store.inner.is_locked());
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[test]
    fn lock_wait_bounds_begin() {
        let store = Arc::new(MemoryStore::new());
        let _held = store
            .transaction_lock(IsolationLevel::Serializable, None)
            .unwrap();
        let mut conn =
            StoreConnection::new(store.clone()).with_lock_wait(Some(Duration::from_millis(10)));

        assert!(matches!(
            conn.begin(),
            Err(ConnectorError::Store(StorageError::LockTimeout(_)))
        ));
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[test]
    fn lock_carries_requested_isolation() {
        let store = Arc::new(MemoryStore::new());
        let mut conn = StoreConnection::new(store).with_isolation(IsolationLevel::Serializable);
        let txn = conn.begin().unwrap();
        assert_eq!(txn.lock().isolation(), IsolationLevel::Serializable);
        assert!(txn.lock().is_active());
        txn.commit().unwrap();
    }
}
