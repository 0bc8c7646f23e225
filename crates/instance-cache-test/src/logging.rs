//! Event capture and tracing setup for tests

use instance_cache::{CacheEvent, EventKind, EventLogger};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Owned copy of a [`CacheEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub level: Level,
    pub kind: EventKind,
    pub message: String,
    pub identifier: String,
    pub error: Option<String>,
}

/// [`EventLogger`] that keeps every event for later inspection
///
/// Clones share the same event list.
#[derive(Clone, Default)]
pub struct RecordingLogger {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingLogger {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Events of one kind
    pub fn of_kind(&self, kind: EventKind) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Sorted identifiers of events of one kind
    pub fn identifiers_of(&self, kind: EventKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .of_kind(kind)
            .into_iter()
            .map(|e| e.identifier)
            .collect();
        ids.sort();
        ids
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventLogger for RecordingLogger {
    fn log(&self, event: &CacheEvent<'_>) {
        self.events.lock().push(RecordedEvent {
            level: event.level,
            kind: event.kind,
            message: event.message.to_string(),
            identifier: event.identifier.to_string(),
            error: event.error.map(|e| e.to_string()),
        });
    }
}

/// Install a test-friendly tracing subscriber
///
/// Honors `RUST_LOG`, defaults to `warn`. Safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
