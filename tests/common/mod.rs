//! Common test utilities for ctxstore integration tests
//!
//! Event builders matching the worked examples, and a store wrapper that
//! fails on demand.

#![allow(dead_code)]

use ctxstore::model::vocab;
use ctxstore::{
    IsolationLevel, MemoryStore, Statement, StatementPattern, StorageError, StorageResult, Term,
    TransactionLock, TripleStore,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const U: &str = "urn:event:U";
pub const S: &str = "urn:user:S";
pub const P: &str = "urn:prop:P";
pub const O: &str = "urn:thing:O";

/// Event `U` reporting `(S, P, O)`
pub fn sample_event(confidence: Option<u8>) -> ctxstore::ContextEvent {
    let mut event = ctxstore::ContextEvent::with_uri(U, S, P, Term::iri(O)).unwrap();
    event.confidence = confidence;
    event
}

pub fn fact() -> Statement {
    Statement::new(Term::iri(S), Term::iri(P), Term::iri(O))
}

/// The reification statements every event carries
pub fn event_node_core() -> Vec<Statement> {
    vec![
        Statement::new(Term::iri(U), Term::iri(vocab::HAS_SUBJECT), Term::iri(S)),
        Statement::new(Term::iri(U), Term::iri(vocab::HAS_PREDICATE), Term::iri(P)),
        Statement::new(Term::iri(U), Term::iri(vocab::HAS_OBJECT), Term::iri(O)),
    ]
}

pub fn about(subject: &str) -> StatementPattern {
    StatementPattern::any().with_subject(Term::iri(subject))
}

/// A [`MemoryStore`] with switchable failures.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_begin: AtomicBool,
    pub fail_commit: AtomicBool,
    /// Fail the add after this many successful adds (0 = never)
    pub fail_add_after: AtomicUsize,
    adds: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn heal(&self) {
        self.fail_begin.store(false, Ordering::SeqCst);
        self.fail_commit.store(false, Ordering::SeqCst);
        self.fail_add_after.store(0, Ordering::SeqCst);
    }
}

impl TripleStore for FlakyStore {
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
            return Err(StorageError::Poisoned("injected begin failure"));
        }
        self.adds.store(0, Ordering::SeqCst);
        self.inner.begin(lock)
    }

    fn commit(&self, lock: &TransactionLock) -> StorageResult<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            self.inner.rollback(lock)?;
            return Err(StorageError::Poisoned("injected commit failure"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(lock)
    }

    fn rollback(&self, lock: &TransactionLock) -> StorageResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback(lock)
    }

    fn add_statement(
        &self,
        lock: &TransactionLock,
        statement: &Statement,
        contexts: &[Term],
        inferred: bool,
    ) -> StorageResult<()> {
        let limit = self.fail_add_after.load(Ordering::SeqCst);
        let done = self.adds.fetch_add(1, Ordering::SeqCst);
        if limit > 0 && done >= limit {
            return Err(StorageError::Poisoned("injected add failure"));
        }
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
