//! Structured event notifications for cache lifecycle.
//!
//! The cache reports every construction, release and failure to an
//! [`EventLogger`]. Loggers are purely observational: nothing they do feeds
//! back into reconciliation.

use std::error::Error;
use std::fmt;
use tracing::{debug, error, info, trace, warn, Level};

/// Kind of lifecycle event reported by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new instance was constructed and stored.
    Added,
    /// An instance was removed and its releaser ran cleanly.
    Removed,
    /// The factory failed for an identifier.
    ConstructionFailed,
    /// A releaser reported failure; the entry is removed regardless.
    ReleaseFailed,
}

impl EventKind {
    /// Returns the event name as used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Removed => "removed",
            EventKind::ConstructionFailed => "construction_failed",
            EventKind::ReleaseFailed => "release_failed",
        }
    }

    /// Returns the default level for this kind of event.
    pub fn level(&self) -> Level {
        match self {
            EventKind::Added | EventKind::Removed => Level::DEBUG,
            EventKind::ConstructionFailed => Level::WARN,
            EventKind::ReleaseFailed => Level::ERROR,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured notification.
#[derive(Debug, Clone, Copy)]
pub struct CacheEvent<'a> {
    /// Severity.
    pub level: Level,
    /// What happened.
    pub kind: EventKind,
    /// Human readable description.
    pub message: &'a str,
    /// Identifier the event concerns.
    pub identifier: &'a str,
    /// Underlying error for failure events.
    pub error: Option<&'a (dyn Error + 'static)>,
}

impl<'a> CacheEvent<'a> {
    /// Creates an event at the kind's default level.
    pub fn new(kind: EventKind, identifier: &'a str, message: &'a str) -> Self {
        Self {
            level: kind.level(),
            kind,
            message,
            identifier,
            error: None,
        }
    }

    /// Attaches the underlying error.
    pub fn with_error(mut self, error: &'a (dyn Error + 'static)) -> Self {
        self.error = Some(error);
        self
    }
}

/// Sink for cache lifecycle events.
pub trait EventLogger: Send + Sync {
    /// Records one event.
    fn log(&self, event: &CacheEvent<'_>);
}

/// Forwards events to `tracing` at the event's level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn log(&self, event: &CacheEvent<'_>) {
        let kind = event.kind.as_str();
        let identifier = event.identifier;
        let message = event.message;

        match (event.level, event.error) {
            (Level::ERROR, Some(e)) => error!(kind, identifier, error = %e, "{}", message),
            (Level::ERROR, None) => error!(kind, identifier, "{}", message),
            (Level::WARN, Some(e)) => warn!(kind, identifier, error = %e, "{}", message),
            (Level::WARN, None) => warn!(kind, identifier, "{}", message),
            (Level::INFO, Some(e)) => info!(kind, identifier, error = %e, "{}", message),
            (Level::INFO, None) => info!(kind, identifier, "{}", message),
            (Level::DEBUG, Some(e)) => debug!(kind, identifier, error = %e, "{}", message),
            (Level::DEBUG, None) => debug!(kind, identifier, "{}", message),
            (_, Some(e)) => trace!(kind, identifier, error = %e, "{}", message),
            (_, None) => trace!(kind, identifier, "{}", message),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl EventLogger for NopLogger {
    fn log(&self, _event: &CacheEvent<'_>) {}
}
