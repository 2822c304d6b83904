//! ContextStore: stores context events through a transactional connection

use super::admission::{Admission, AdmissionPolicy, ConfidenceFilter};
use super::cardinality::{CardinalityPolicy, FunctionalPredicates, Unbounded};
use super::change::{ChangeEvent, ChangeNotifier, ChangeSink};
use super::connection::{StoreConnection, Transaction};
use super::{ConnectorError, ConnectorResult};
use crate::config::ConnectorConfig;
use crate::extract::{extract_statements, ParseError, TurtleSerializer};
use crate::model::vocab::DEFAULT_SCOPE_PREFIX;
use crate::model::{ContextEvent, Statement, StatementPattern, Term};
use crate::storage::{OpenStore, SqliteStore, TripleStore};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What `store_event` did with one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    pub admission: Admission,
    /// Statements added per graph (before fan-out over graphs)
    pub statements_stored: usize,
    /// Graphs the statements went into; empty means the default graph
    pub graphs: Vec<Term>,
}

/// Event-level facade over a triple store.
///
/// `store_event` calls on one `ContextStore` are serialized: each event is
/// admitted, extracted and committed in its own transaction before the next
/// one starts.
pub struct ContextStore<S: TripleStore + ?Sized> {
    store: Arc<S>,
    connection: Mutex<StoreConnection<S>>,
    notifier: Arc<ChangeNotifier>,
    confidence: Arc<ConfidenceFilter>,
    admission: Arc<dyn AdmissionPolicy>,
    cardinality: Arc<dyn CardinalityPolicy>,
    serializer: TurtleSerializer,
    tenant_aware: bool,
    scope_prefix: String,
}

impl<S: TripleStore + ?Sized> ContextStore<S> {
    /// Threshold 0, no tenant graphs, no cardinality constraints
    pub fn new(store: Arc<S>) -> Self {
        let notifier = ChangeNotifier::new();
        let connection = StoreConnection::new(store.clone()).with_notifier(notifier.clone());
        let confidence = Arc::new(ConfidenceFilter::new(0));
        Self {
            store,
            connection: Mutex::new(connection),
            notifier,
            admission: confidence.clone(),
            confidence,
            cardinality: Arc::new(Unbounded),
            serializer: TurtleSerializer::new(),
            tenant_aware: false,
            scope_prefix: DEFAULT_SCOPE_PREFIX.to_string(),
        }
    }

    /// Build a connector over `store` with every setting from `config`
    /// except the database location and preloading.
    pub fn with_config(store: Arc<S>, config: &ConnectorConfig) -> Self {
        let mut this = Self::new(store)
            .with_tenant_graphs(config.tenant_aware)
            .with_scope_prefix(config.scope_prefix.clone());
        this.confidence.set_threshold(i64::from(config.threshold()));
        if !config.functional_predicates.is_empty() {
            this = this.with_cardinality(Arc::new(FunctionalPredicates::new(
                config.functional_predicates.iter().cloned(),
            )));
        }
        {
            let conn = this.connection_mut();
            conn.set_isolation(config.isolation);
            conn.set_lock_wait(config.lock_wait());
        }
        this
    }

    /// Replace the confidence gate with another admission policy.
    /// `threshold()`/`set_threshold()` keep working but no longer apply.
    pub fn with_admission(mut self, policy: Arc<dyn AdmissionPolicy>) -> Self {
        self.admission = policy;
        self
    }

    pub fn with_cardinality(mut self, policy: Arc<dyn CardinalityPolicy>) -> Self {
        self.cardinality = policy;
        self
    }

    /// Store events into graphs named after their scopes
    pub fn with_tenant_graphs(mut self, enabled: bool) -> Self {
        self.tenant_aware = enabled;
        self
    }

    pub fn with_scope_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scope_prefix = prefix.into();
        self
    }

    pub fn with_threshold(self, threshold: i64) -> Self {
        self.set_threshold(threshold);
        self
    }

    fn connection_mut(&mut self) -> &mut StoreConnection<S> {
        self.connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn connection(&self) -> MutexGuard<'_, StoreConnection<S>> {
        // a panicking writer's transaction rolled back on unwind
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn threshold(&self) -> u8 {
        self.confidence.threshold()
    }

    /// Set the confidence threshold; clamped into `0..=100`
    pub fn set_threshold(&self, threshold: i64) {
        self.confidence.set_threshold(threshold);
    }

    /// Register a sink for commit notifications
    pub fn subscribe(&self, sink: Arc<dyn ChangeSink>) {
        self.notifier.subscribe(sink);
    }

    pub fn is_tenant_aware(&self) -> bool {
        self.tenant_aware
    }

    /// Graph identifiers `event` is stored into
    pub fn graphs_for(&self, event: &ContextEvent) -> Vec<Term> {
        if self.tenant_aware {
            event.graphs(&self.scope_prefix)
        } else {
            Vec::new()
        }
    }

    /// Persist one event.
    ///
    /// Below the threshold only the statements about the event node itself
    /// are stored; otherwise everything. Either way the statements are
    /// committed in one transaction, or not at all.
    pub fn store_event(&self, event: &ContextEvent) -> ConnectorResult<StoreOutcome> {
        let mut conn = self.connection();
        tracing::debug!(uri = %event.uri, confidence = ?event.confidence, "storing context event");

        let graphs = self.graphs_for(event);
        if let Err(e) = validate_event(event, &graphs) {
            tracing::error!(uri = %event.uri, error = %e, "rejecting malformed context event");
            return Err(e.into());
        }
        let admission = self.admission.decide(event);
        let turtle = self.serializer.serialize(event);
        let extracted = extract_statements(&turtle, &event.uri).map_err(|e| {
            tracing::error!(uri = %event.uri, error = %e, "cannot extract event statements");
            e
        })?;
        let statements = self.admission.filter(event, admission, extracted);

        let mut txn = conn.begin()?;
        if let Err(e) = self.apply(&mut txn, &statements, &graphs) {
            tracing::error!(uri = %event.uri, error = %e, "storing event failed, rolling back");
            if let Err(rollback) = txn.rollback() {
                tracing::warn!(error = %rollback, "rollback after failed store also failed");
            }
            return Err(e);
        }
        txn.commit()?;

        match (admission, event.confidence) {
            (Admission::Partial, _) => {
                tracing::info!(uri = %event.uri, "stored a context event with low confidence: not reified")
            }
            (Admission::Full, Some(_)) => {
                tracing::info!(uri = %event.uri, "stored a context event with high confidence")
            }
            (Admission::Full, None) => {
                tracing::info!(uri = %event.uri, "stored a context event without confidence")
            }
        }

        Ok(StoreOutcome {
            admission,
            statements_stored: statements.len(),
            graphs,
        })
    }

    fn apply(
        &self,
        txn: &mut Transaction<'_, S>,
        statements: &[Statement],
        graphs: &[Term],
    ) -> ConnectorResult<()> {
        for statement in statements {
            if let Some(pattern) = self.cardinality.displaced(statement, graphs) {
                txn.remove_statements(&pattern)?;
            }
            txn.add_statement(statement, graphs)?;
        }
        Ok(())
    }

    /// Load Turtle files into the default graph, all in one transaction.
    ///
    /// Every file is read and parsed before anything is written; a bad file
    /// leaves the store untouched. Returns the number of statements added.
    pub fn populate(&self, files: &[PathBuf]) -> ConnectorResult<usize> {
        let mut statements = Vec::new();
        for path in files {
            let text = std::fs::read_to_string(path).map_err(|source| {
                tracing::error!(path = %path.display(), error = %source, "cannot read preload file");
                ConnectorError::Preload {
                    path: path.clone(),
                    source,
                }
            })?;
            let parsed = extract_statements(&text, &file_base(path)).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "cannot parse preload file");
                e
            })?;
            tracing::debug!(path = %path.display(), statements = parsed.len(), "parsed preload file");
            statements.extend(parsed);
        }

        let mut conn = self.connection();
        let mut txn = conn.begin()?;
        for statement in &statements {
            txn.add_statement(statement, &[])?;
        }
        txn.commit()?;

        tracing::info!(files = files.len(), statements = statements.len(), "store populated");
        Ok(statements.len())
    }

    /// Remove every statement in `graphs`, or everything when empty
    pub fn clear(&self, graphs: &[Term]) -> ConnectorResult<ChangeEvent> {
        let mut conn = self.connection();
        let mut txn = conn.begin()?;
        txn.clear(graphs)?;
        txn.clear_inferred(graphs)?;
        txn.commit()
    }

    /// Committed statements matching `pattern`, asserted and inferred
    pub fn statements(&self, pattern: &StatementPattern) -> ConnectorResult<Vec<Statement>> {
        Ok(self.store.statements(pattern, true)?)
    }

    pub fn len(&self) -> ConnectorResult<usize> {
        Ok(self.store.len()?)
    }

    pub fn is_empty(&self) -> ConnectorResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl ContextStore<SqliteStore> {
    /// Open the configured SQLite database and preload it when asked to.
    pub fn open(config: &ConnectorConfig) -> ConnectorResult<Self> {
        let path = config.database_path();
        let store = SqliteStore::open(&path).map_err(|source| {
            tracing::error!(path = %path.display(), error = %source, "cannot open store");
            ConnectorError::Connection {
                path: path.clone(),
                source,
            }
        })?;
        tracing::debug!(path = %path.display(), "store opened");

        let this = Self::with_config(Arc::new(store), config);
        if config.preload {
            this.populate(&config.preload_files)?;
        }
        Ok(this)
    }

    /// Open the configured database without write access
    pub fn open_read_only(config: &ConnectorConfig) -> ConnectorResult<Self> {
        let path = config.database_path();
        let store = SqliteStore::open_read_only(&path).map_err(|source| {
            tracing::error!(path = %path.display(), error = %source, "cannot open store");
            ConnectorError::Connection {
                path: path.clone(),
                source,
            }
        })?;
        Ok(Self::with_config(Arc::new(store), config))
    }
}

impl<S: TripleStore + ?Sized> std::fmt::Debug for ContextStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("threshold", &self.threshold())
            .field("tenant_aware", &self.tenant_aware)
            .field("scope_prefix", &self.scope_prefix)
            .finish()
    }
}

/// An event whose IRIs cannot be written as Turtle never reaches the
/// serializer
fn validate_event(event: &ContextEvent, graphs: &[Term]) -> Result<(), ParseError> {
    event.validate()?;
    for graph in graphs {
        graph.validate()?;
    }
    Ok(())
}

/// `file://` base IRI for a preload file, percent-encoding what an IRI
/// cannot hold
fn file_base(path: &Path) -> String {
    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut base = String::from("file://");
    for byte in absolute.to_string_lossy().bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                base.push(byte as char)
            }
            other => base.push_str(&format!("%{:02X}", other)),
        }
    }
    base
}
