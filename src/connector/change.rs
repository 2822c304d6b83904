//! Change notification: what a committed transaction did, and who hears about it

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Whether a transaction added and/or removed statements.
///
/// Flags are set optimistically: a mutation counts even when it turned out
/// to be a no-op in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    statements_added: bool,
    statements_removed: bool,
}

impl ChangeEvent {
    /// A fresh event with both flags cleared
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(statements_added: bool, statements_removed: bool) -> Self {
        Self {
            statements_added,
            statements_removed,
        }
    }

    pub fn statements_added(&self) -> bool {
        self.statements_added
    }

    pub fn statements_removed(&self) -> bool {
        self.statements_removed
    }

    pub fn set_statements_added(&mut self) {
        self.statements_added = true;
    }

    pub fn set_statements_removed(&mut self) {
        self.statements_removed = true;
    }

    pub fn has_changes(&self) -> bool {
        self.statements_added || self.statements_removed
    }
}

/// Receives one [`ChangeEvent`] per successful commit.
pub trait ChangeSink: Send + Sync {
    fn store_changed(&self, event: ChangeEvent);
}

/// Fans commit notifications out to every subscribed sink.
#[derive(Default)]
pub struct ChangeNotifier {
    sinks: RwLock<Vec<Arc<dyn ChangeSink>>>,
}

impl ChangeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(&self, sink: Arc<dyn ChangeSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn notify(&self, event: ChangeEvent) {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        for sink in sinks.iter() {
            sink.store_changed(event);
        }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("sinks", &self.sink_count())
            .finish()
    }
}

/// Keeps every notification it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeSink for RecordingSink {
    fn store_changed(&self, event: ChangeEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Publishes notifications on a tokio broadcast channel.
///
/// Slow subscribers lag rather than block the committing writer.
#[derive(Debug)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

impl ChangeSink for BroadcastSink {
    fn store_changed(&self, event: ChangeEvent) {
        // no receivers is not an error
        let _ = self.sender.send(event);
    }
}

/// Logs each notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ChangeSink for LogSink {
    fn store_changed(&self, event: ChangeEvent) {
        tracing::debug!(
            added = event.statements_added(),
            removed = event.statements_removed(),
            "store changed"
        );
    }
}
