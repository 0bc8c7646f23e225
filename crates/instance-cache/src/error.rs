//! Error types for instance cache operations.
//!
//! Construction and release failures are contained per identifier and only
//! ever reach the [`EventLogger`](crate::EventLogger). [`CacheError`] is the
//! only error a caller of the cache itself can observe.

use std::io;
use thiserror::Error;

/// Boxed error type carried as the underlying cause of collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the cache to its callers.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The committed entry view could not be read.
    #[error("Entry store unavailable: {reason}")]
    StoreUnavailable {
        /// Why the store could not be read.
        reason: String,
    },

    /// The store holds no entries and the cache is configured to treat
    /// that as a failure.
    #[error("No instances available")]
    Empty,

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Failed to read a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CacheError {
    /// Creates a store unavailable error.
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error only reports an empty store.
    pub fn is_empty(&self) -> bool {
        matches!(self, CacheError::Empty)
    }
}

/// Errors raised by an [`InstanceFactory`](crate::InstanceFactory) for one
/// identifier.
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// The identifier cannot name an endpoint (e.g. unparsable address).
    #[error("Invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier {
        /// The rejected identifier.
        identifier: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The endpoint was reachable in principle but the client could not be
    /// brought up.
    #[error("Failed to connect to '{identifier}': {source}")]
    Connect {
        /// The identifier being constructed.
        identifier: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// Any other construction failure.
    #[error("Construction failed: {message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl ConstructionError {
    /// Creates an invalid identifier error.
    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Creates a connect error wrapping an underlying cause.
    pub fn connect(identifier: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connect {
            identifier: identifier.into(),
            source: source.into(),
        }
    }

    /// Creates a generic construction error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Errors raised by a [`Releaser`](crate::Releaser).
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Closing the underlying resource failed.
    #[error("Release failed: {message}")]
    Failed {
        /// Error message.
        message: String,
    },

    /// IO error while closing the underlying resource.
    #[error("IO error during release: {0}")]
    Io(#[from] io::Error),
}

impl ReleaseError {
    /// Creates a release failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
