//! ctxstore: Confidence-Gated Context Event Store
//!
//! Persists timestamped observations ("context events") into a triple store.
//! Each event is serialized to Turtle, split into statements, and committed
//! in one lock-guarded transaction. Events whose confidence falls below the
//! connector's threshold are stored without the fact they report: only the
//! statements describing the event node itself are kept.
//!
//! # Core Concepts
//!
//! - **Events**: `ContextEvent`, a subject/predicate/object observation with
//!   optional confidence, scopes, timestamp and provider
//! - **Stores**: engines behind the `TripleStore` trait (`SqliteStore`,
//!   `MemoryStore`) with buffered, all-or-nothing transactions
//! - **Connections**: `StoreConnection` hands out `Transaction`s that own the
//!   store's lock and fire one `ChangeEvent` per successful commit
//! - **Policies**: admission (how much of an event to keep) and cardinality
//!   (which old statements a new one replaces)
//!
//! # Example
//!
//! ```
//! use ctxstore::{ContextEvent, ContextStore, MemoryStore, Term};
//! use std::sync::Arc;
//!
//! let store = ContextStore::new(Arc::new(MemoryStore::new())).with_threshold(50);
//! let event = ContextEvent::new("urn:user:ana", "urn:p:location", Term::iri("urn:room:kitchen"))
//!     .unwrap()
//!     .with_confidence(30);
//! let outcome = store.store_event(&event).unwrap();
//! assert_eq!(outcome.admission, ctxstore::Admission::Partial);
//! ```

pub mod config;
pub mod connector;
pub mod extract;
pub mod model;
pub mod storage;

pub use config::{ConfigError, ConnectorConfig};
pub use connector::{
    Admission, AdmissionPolicy, AdmitAll, BroadcastSink, CardinalityPolicy, ChangeEvent,
    ChangeNotifier, ChangeSink, ConfidenceFilter, ConnectionState, ConnectorError,
    ConnectorResult, ContextStore, FunctionalPredicates, LogSink, RecordingSink, StoreConnection,
    StoreOutcome, Transaction, Unbounded,
};
pub use extract::{extract_statements, ParseError, TurtleSerializer};
pub use model::{ContextEvent, Statement, StatementPattern, Term, TermError};
pub use storage::{
    IsolationLevel, MemoryStore, OpenStore, SqliteStore, StorageError, StorageResult,
    TransactionLock, TripleStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
