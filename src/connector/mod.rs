//! The connector between context events and a triple store
//!
//! `StoreConnection` wraps a store engine with lock-disciplined transactions
//! and change notification. `ContextStore` sits on top and turns events into
//! statements, gated by an admission policy and a cardinality policy.

mod admission;
mod cardinality;
mod change;
mod connection;
mod context_store;

pub use admission::{clamp_threshold, Admission, AdmissionPolicy, AdmitAll, ConfidenceFilter};
pub use cardinality::{CardinalityPolicy, FunctionalPredicates, Unbounded};
pub use change::{BroadcastSink, ChangeEvent, ChangeNotifier, ChangeSink, LogSink, RecordingSink};
pub use connection::{ConnectionState, StoreConnection, Transaction};
pub use context_store::{ContextStore, StoreOutcome};

use crate::config::ConfigError;
use crate::extract::ParseError;
use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the connector
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("store is read-only")]
    ReadOnly,

    #[error("cannot extract statements: {0}")]
    Parse(#[from] ParseError),

    #[error("store error: {0}")]
    Store(#[from] StorageError),

    #[error("cannot connect to store at {path}: {source}")]
    Connection {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("cannot read preload file {path}: {source}")]
    Preload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;
