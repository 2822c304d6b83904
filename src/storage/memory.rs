//! In-memory triple store

use super::lock::{LockManager, TransactionLock};
use super::pending::{PendingOp, TxnBuffer};
use super::traits::{IsolationLevel, StorageError, StorageResult, TripleStore};
use crate::model::{Statement, StatementPattern, Term};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
struct Graphs {
    asserted: BTreeSet<Statement>,
    inferred: BTreeSet<Statement>,
}

impl Graphs {
    fn set_mut(&mut self, inferred: bool) -> &mut BTreeSet<Statement> {
        if inferred {
            &mut self.inferred
        } else {
            &mut self.asserted
        }
    }

    fn apply(&mut self, op: PendingOp) {
        match op {
            PendingOp::Add {
                statement,
                inferred,
            } => {
                self.set_mut(inferred).insert(statement);
            }
            PendingOp::Remove { pattern, inferred } => {
                self.set_mut(inferred).retain(|st| !pattern.matches(st));
            }
            PendingOp::Clear { contexts, inferred } => {
                let set = self.set_mut(inferred);
                if contexts.is_empty() {
                    set.clear();
                } else {
                    set.retain(|st| !st.context.as_ref().map_or(false, |c| contexts.contains(c)));
                }
            }
        }
    }
}

/// Volatile store keeping every statement in memory.
///
/// Writability can be toggled to simulate a locked or read-only data file.
#[derive(Debug)]
pub struct MemoryStore {
    txn: TxnBuffer,
    graphs: RwLock<Graphs>,
    writable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            txn: TxnBuffer::new(LockManager::new()),
            graphs: RwLock::new(Graphs::default()),
            writable: AtomicBool::new(true),
        }
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// True while a transaction holds this store's lock
    pub fn is_locked(&self) -> bool {
        self.txn.locks().is_locked()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TripleStore for MemoryStore {
    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn transaction_lock(
        &self,
        isolation: IsolationLevel,
        wait: Option<Duration>,
    ) -> StorageResult<TransactionLock> {
        self.txn.locks().acquire(isolation, wait)
    }

    fn begin(&self, lock: &TransactionLock) -> StorageResult<()> {
        self.txn.begin(lock)
    }

    fn commit(&self, lock: &TransactionLock) -> StorageResult<()> {
        let ops = self.txn.take(lock)?;
        let mut graphs = self
            .graphs
            .write()
            .map_err(|_| StorageError::Poisoned("memory graphs"))?;
        for op in ops {
            graphs.apply(op);
        }
        Ok(())
    }

    fn rollback(&self, lock: &TransactionLock) -> StorageResult<()> {
        self.txn.take(lock).map(|_| ())
    }

    fn add_statement(
        &self,
        lock: &TransactionLock,
        statement: &Statement,
        contexts: &[Term],
        inferred: bool,
    ) -> StorageResult<()> {
        let statements = statement.in_contexts(contexts);
        for statement in &statements {
            statement.validate()?;
        }
        for statement in statements {
            self.txn.push(
                lock,
                PendingOp::Add {
                    statement,
                    inferred,
                },
            )?;
        }
        Ok(())
    }

    fn remove_statements(
        &self,
        lock: &TransactionLock,
        pattern: &StatementPattern,
        inferred: bool,
    ) -> StorageResult<()> {
        self.txn.push(
            lock,
            PendingOp::Remove {
                pattern: pattern.clone(),
                inferred,
            },
        )
    }

    fn clear(&self, lock: &TransactionLock, contexts: &[Term], inferred: bool) -> StorageResult<()> {
        self.txn.push(
            lock,
            PendingOp::Clear {
                contexts: contexts.to_vec(),
                inferred,
            },
        )
    }

    fn statements(
        &self,
        pattern: &StatementPattern,
        include_inferred: bool,
    ) -> StorageResult<Vec<Statement>> {
        let graphs = self
            .graphs
            .read()
            .map_err(|_| StorageError::Poisoned("memory graphs"))?;
        let mut out: Vec<Statement> = graphs
            .asserted
            .iter()
            .filter(|st| pattern.matches(st))
            .cloned()
            .collect();
        if include_inferred {
            out.extend(graphs.inferred.iter().filter(|st| pattern.matches(st)).cloned());
        }
        Ok(out)
    }

    fn len(&self) -> StorageResult<usize> {
        let graphs = self
            .graphs
            .read()
            .map_err(|_| StorageError::Poisoned("memory graphs"))?;
        Ok(graphs.asserted.len() + graphs.inferred.len())
    }

    fn contexts(&self) -> StorageResult<Vec<Term>> {
        let graphs = self
            .graphs
            .read()
            .map_err(|_| StorageError::Poisoned("memory graphs"))?;
        let contexts: BTreeSet<Term> = graphs
            .asserted
            .iter()
            .chain(graphs.inferred.iter())
            .filter_map(|st| st.context.clone())
            .collect();
        Ok(contexts.into_iter().collect())
    }
}
