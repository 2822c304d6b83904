//! SQLite storage backend for ctxstore

use super::lock::{LockManager, TransactionLock};
use super::pending::{PendingOp, TxnBuffer};
use super::traits::{IsolationLevel, OpenStore, StorageError, StorageResult, TripleStore};
use crate::extract::parse_term;
use crate::model::{Statement, StatementPattern, Term};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite-backed triple store
///
/// Uses a single table of quads; terms are stored in their N-Triples form and
/// the default graph is the empty string. Thread-safe via internal mutex on
/// the connection.
///
/// Mutations are buffered in memory for the lock holder and applied inside
/// one SQLite transaction on commit, so a failed commit leaves the file
/// untouched and readers never see half a transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    txn: TxnBuffer,
    read_only: bool,
}

impl SqliteStore {
    /// Initialize the database schema
    ///
    /// 1. Create the base table (safe for existing DBs)
    /// 2. Run migrations for columns added later
    /// 3. Create indexes (now that all columns exist)
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- One row per (statement, graph)
            CREATE TABLE IF NOT EXISTS statements (
                subject TEXT NOT NULL,
                predicate TEXT NOT NULL,
                object TEXT NOT NULL,
                context TEXT NOT NULL DEFAULT ''
            );

            -- Enable WAL mode so readers are not blocked by a committing writer
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Self::migrate_add_inferred(conn)?;
        Self::create_indexes(conn)?;

        Ok(())
    }

    /// Migration: track inferred statements apart from asserted ones
    ///
    /// SQLite doesn't support ALTER TABLE ADD COLUMN IF NOT EXISTS,
    /// so we check if the column exists first using table_info pragma.
    /// Existing rows are asserted statements.
    fn migrate_add_inferred(conn: &Connection) -> StorageResult<()> {
        let has_inferred: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('statements') WHERE name = 'inferred'",
            [],
            |row| row.get(0),
        )?;

        if !has_inferred {
            conn.execute(
                "ALTER TABLE statements ADD COLUMN inferred INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }

        Ok(())
    }

    fn create_indexes(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_statements_quad
                ON statements(subject, predicate, object, context, inferred);
            CREATE INDEX IF NOT EXISTS idx_statements_predicate
                ON statements(predicate, object);
            CREATE INDEX IF NOT EXISTS idx_statements_context
                ON statements(context);
            "#,
        )?;
        Ok(())
    }

    fn with_connection(conn: Connection, read_only: bool) -> Self {
        Self {
            conn: Mutex::new(conn),
            txn: TxnBuffer::new(LockManager::new()),
            read_only,
        }
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Poisoned("sqlite connection"))
    }

    fn encode_context(context: &Option<Term>) -> String {
        context.as_ref().map(Term::to_ntriples).unwrap_or_default()
    }

    fn decode_term(raw: &str) -> StorageResult<Term> {
        parse_term(raw).map_err(|e| StorageError::Corrupt(format!("{} ({})", raw, e)))
    }

    /// Deserialize a statement from database columns
    fn row_to_statement(
        subject: String,
        predicate: String,
        object: String,
        context: String,
    ) -> StorageResult<Statement> {
        let mut statement = Statement::new(
            Self::decode_term(&subject)?,
            Self::decode_term(&predicate)?,
            Self::decode_term(&object)?,
        );
        if !context.is_empty() {
            statement.context = Some(Self::decode_term(&context)?);
        }
        Ok(statement)
    }

    /// WHERE clause and bound values for a pattern.
    ///
    /// `inferred = None` matches both asserted and inferred rows.
    fn where_clause(pattern: &StatementPattern, inferred: Option<bool>) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        for (column, term) in [
            ("subject", &pattern.subject),
            ("predicate", &pattern.predicate),
            ("object", &pattern.object),
        ] {
            if let Some(term) = term {
                values.push(Value::Text(term.to_ntriples()));
                clauses.push(format!("{} = ?{}", column, values.len()));
            }
        }

        if !pattern.contexts.is_empty() {
            let placeholders: Vec<String> = pattern
                .contexts
                .iter()
                .map(|ctx| {
                    values.push(Value::Text(ctx.to_ntriples()));
                    format!("?{}", values.len())
                })
                .collect();
            clauses.push(format!("context IN ({})", placeholders.join(",")));
        }

        if let Some(inferred) = inferred {
            values.push(Value::Integer(inferred as i64));
            clauses.push(format!("inferred = ?{}", values.len()));
        }

        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (sql, values)
    }

    fn apply(conn: &Connection, op: &PendingOp) -> StorageResult<()> {
        match op {
            PendingOp::Add {
                statement,
                inferred,
            } => {
                conn.execute(
                    r#"
                    INSERT OR IGNORE INTO statements (subject, predicate, object, context, inferred)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    params![
                        statement.subject.to_ntriples(),
                        statement.predicate.to_ntriples(),
                        statement.object.to_ntriples(),
                        Self::encode_context(&statement.context),
                        *inferred as i64,
                    ],
                )?;
            }
            PendingOp::Remove { pattern, inferred } => {
                let (clause, values) = Self::where_clause(pattern, Some(*inferred));
                conn.execute(
                    &format!("DELETE FROM statements{}", clause),
                    params_from_iter(values),
                )?;
            }
            PendingOp::Clear { contexts, inferred } => {
                let pattern = StatementPattern::any().in_contexts(contexts);
                let (clause, values) = Self::where_clause(&pattern, Some(*inferred));
                conn.execute(
                    &format!("DELETE FROM statements{}", clause),
                    params_from_iter(values),
                )?;
            }
        }
        Ok(())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self::with_connection(conn, false))
    }

    fn open_read_only(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self::with_connection(conn, true))
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self::with_connection(conn, false))
    }
}

impl TripleStore for SqliteStore {
    fn is_writable(&self) -> bool {
        !self.read_only
    }

    fn transaction_lock(
        &self,
        isolation: IsolationLevel,
        wait: Option<Duration>,
    ) -> StorageResult<TransactionLock> {
        self.txn.locks().acquire(isolation, wait)
    }

    // === Transaction bookkeeping ===

    fn begin(&self, lock: &TransactionLock) -> StorageResult<()> {
        self.txn.begin(lock)
    }

    fn commit(&self, lock: &TransactionLock) -> StorageResult<()> {
        let ops = self.txn.take(lock)?;
        if ops.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for op in &ops {
            Self::apply(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn rollback(&self, lock: &TransactionLock) -> StorageResult<()> {
        self.txn.take(lock).map(|_| ())
    }

    // === Mutations ===

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

    // === Reads ===

    fn statements(
        &self,
        pattern: &StatementPattern,
        include_inferred: bool,
    ) -> StorageResult<Vec<Statement>> {
        let conn = self.conn()?;
        let inferred = if include_inferred { None } else { Some(false) };
        let (clause, values) = Self::where_clause(pattern, inferred);
        let mut stmt = conn.prepare(&format!(
            "SELECT subject, predicate, object, context FROM statements{} ORDER BY rowid",
            clause
        ))?;

        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut statements = Vec::new();
        for row in rows {
            let (subject, predicate, object, context) = row?;
            statements.push(Self::row_to_statement(subject, predicate, object, context)?);
        }
        Ok(statements)
    }

    fn len(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM statements", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn contexts(&self) -> StorageResult<Vec<Term>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT context FROM statements WHERE context != '' ORDER BY context",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut contexts = Vec::new();
        for row in rows {
            contexts.push(Self::decode_term(&row?)?);
        }
        Ok(contexts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{xsd, TermError};

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn st(s: &str, p: &str, o: Term) -> Statement {
        Statement::new(Term::iri(s), Term::iri(p), o)
    }

    fn write(store: &SqliteStore, f: impl FnOnce(&TransactionLock)) {
        let lock = store.transaction_lock(IsolationLevel::Snapshot, None).unwrap();
        store.begin(&lock).unwrap();
        f(&lock);
        store.commit(&lock).unwrap();
    }

    #[test]
    fn test_add_and_read_back_terms() {
        let store = create_test_store();
        let fact = st("urn:s", "urn:p", Term::typed_literal("21.5", xsd::DECIMAL));
        let labelled = st("urn:s", "urn:label", Term::lang_literal("cocina", "es"));
        write(&store, |lock| {
            store.add_statement(lock, &fact, &[], false).unwrap();
            store.add_statement(lock, &labelled, &[], false).unwrap();
        });

        let loaded = store.statements(&StatementPattern::any(), false).unwrap();
        assert_eq!(loaded, vec![fact, labelled]);
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let store = create_test_store();
        let fact = st("urn:s", "urn:p", Term::iri("urn:o"));
        write(&store, |lock| {
            store.add_statement(lock, &fact, &[], false).unwrap();
            store.add_statement(lock, &fact, &[], false).unwrap();
        });
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_uncommitted_writes_not_visible() {
        let store = create_test_store();
        let lock = store.transaction_lock(IsolationLevel::Snapshot, None).unwrap();
        store.begin(&lock).unwrap();
        store
            .add_statement(&lock, &st("urn:s", "urn:p", Term::iri("urn:o")), &[], false)
            .unwrap();
        assert_eq!(store.len().unwrap(), 0);
        store.rollback(&lock).unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_contexts_and_graph_patterns() {
        let store = create_test_store();
        let graphs = [Term::iri("urn:g:a"), Term::iri("urn:g:b")];
        write(&store, |lock| {
            store
                .add_statement(lock, &st("urn:s", "urn:p", Term::iri("urn:o")), &graphs, false)
                .unwrap();
            store
                .add_statement(lock, &st("urn:t", "urn:p", Term::iri("urn:o")), &[], false)
                .unwrap();
        });

        assert_eq!(store.contexts().unwrap(), graphs.to_vec());
        let in_a = store
            .statements(&StatementPattern::any().in_contexts(&graphs[..1]), false)
            .unwrap();
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_a[0].context, Some(graphs[0].clone()));
    }

    #[test]
    fn test_remove_by_pattern() {
        let store = create_test_store();
        write(&store, |lock| {
            store
                .add_statement(lock, &st("urn:s", "urn:p", Term::iri("urn:o1")), &[], false)
                .unwrap();
            store
                .add_statement(lock, &st("urn:s", "urn:q", Term::iri("urn:o2")), &[], false)
                .unwrap();
        });
        write(&store, |lock| {
            let pattern = StatementPattern::any()
                .with_subject(Term::iri("urn:s"))
                .with_predicate(Term::iri("urn:p"));
            store.remove_statements(lock, &pattern, false).unwrap();
        });

        let left = store.statements(&StatementPattern::any(), false).unwrap();
        assert_eq!(left, vec![st("urn:s", "urn:q", Term::iri("urn:o2"))]);
    }

    #[test]
    fn test_inferred_statements_kept_apart() {
        let store = create_test_store();
        let fact = st("urn:s", "urn:p", Term::iri("urn:o"));
        write(&store, |lock| {
            store.add_statement(lock, &fact, &[], true).unwrap();
        });
        assert!(store.statements(&StatementPattern::any(), false).unwrap().is_empty());
        assert_eq!(store.statements(&StatementPattern::any(), true).unwrap().len(), 1);

        write(&store, |lock| {
            store.clear(lock, &[], false).unwrap();
        });
        assert_eq!(store.len().unwrap(), 1, "clearing asserted keeps inferred");
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();

        assert_eq!(journal_mode, "wal", "SqliteStore must enable WAL mode at connection time");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("persist.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            write(&store, |lock| {
                store
                    .add_statement(lock, &st("urn:s", "urn:p", Term::literal("v")), &[], false)
                    .unwrap();
            });
        }
        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_read_only_store_is_not_writable() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ro.db");
        drop(SqliteStore::open(&db_path).unwrap());

        let store = SqliteStore::open_read_only(&db_path).unwrap();
        assert!(!store.is_writable());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_migration_adds_inferred_column() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE statements (
                    subject TEXT NOT NULL,
                    predicate TEXT NOT NULL,
                    object TEXT NOT NULL,
                    context TEXT NOT NULL DEFAULT ''
                );
                INSERT INTO statements VALUES ('<urn:s>', '<urn:p>', '<urn:o>', '');
                "#,
            )
            .unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        let asserted = store.statements(&StatementPattern::any(), false).unwrap();
        assert_eq!(asserted, vec![st("urn:s", "urn:p", Term::iri("urn:o"))]);
    }

    #[test]
    fn test_corrupt_term_reported() {
        let store = create_test_store();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO statements (subject, predicate, object) VALUES ('not a term', '<urn:p>', '<urn:o>')",
                [],
            )
            .unwrap();
        let err = store.statements(&StatementPattern::any(), false).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn test_invalid_iri_rejected_before_it_reaches_disk() {
        let store = create_test_store();
        let good = st("urn:s", "urn:p", Term::iri("urn:o"));
        write(&store, |lock| {
            store.add_statement(lock, &good, &[], false).unwrap();
            let spaced = st("urn:a b", "urn:p", Term::iri("urn:o"));
            assert!(matches!(
                store.add_statement(lock, &spaced, &[], false),
                Err(StorageError::InvalidTerm(_))
            ));
            let injected = st("urn:s", "urn:p", Term::iri("urn:o> , <urn:evil"));
            assert!(store.add_statement(lock, &injected, &[], false).is_err());
        });

        // later reads still decode
        assert_eq!(
            store.statements(&StatementPattern::any(), false).unwrap(),
            vec![good]
        );
    }

    #[test]
    fn test_literal_subject_is_an_invalid_term() {
        let store = create_test_store();
        let lock = store.transaction_lock(IsolationLevel::Snapshot, None).unwrap();
        store.begin(&lock).unwrap();
        let literal_subject =
            Statement::new(Term::literal("x"), Term::iri("urn:p"), Term::iri("urn:o"));
        assert!(matches!(
            store.add_statement(&lock, &literal_subject, &[], false),
            Err(StorageError::InvalidTerm(TermError::NotAResource(_)))
        ));
        let fact = st("urn:s", "urn:p", Term::iri("urn:o"));
        let graphs = [Term::iri("urn:g"), Term::iri("g 2")];
        assert!(matches!(
            store.add_statement(&lock, &fact, &graphs, false),
            Err(StorageError::InvalidTerm(_))
        ));
        store.commit(&lock).unwrap();
        assert!(store.is_empty().unwrap());
    }
}
