//! Storage backends for ctxstore
//!
//! Store engines implement the `TripleStore` trait: lock-guarded, buffered
//! transactions over a set of quads. `SqliteStore` is the persistent engine;
//! `MemoryStore` keeps everything in memory.

mod lock;
mod memory;
mod pending;
mod sqlite;
mod traits;

pub use lock::{LockManager, TransactionLock};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{IsolationLevel, OpenStore, StorageError, StorageResult, TripleStore};
