//! Cache configuration.
//!
//! Loaded from TOML; every field has a default so an empty file (or no file
//! at all) yields a working sequential cache.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Reconciliation and read-path settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Report [`CacheError::Empty`] from `snapshot` when no entries exist
    #[serde(default)]
    pub empty_is_error: bool,

    /// Factory calls allowed in flight during one update
    #[serde(default = "default_max_concurrent_constructions")]
    pub max_concurrent_constructions: usize,

    /// Release calls allowed in flight during one update
    #[serde(default = "default_max_concurrent_releases")]
    pub max_concurrent_releases: usize,
}

fn default_max_concurrent_constructions() -> usize {
    1
}

fn default_max_concurrent_releases() -> usize {
    1
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            empty_is_error: false,
            max_concurrent_constructions: default_max_concurrent_constructions(),
            max_concurrent_releases: default_max_concurrent_releases(),
        }
    }
}

impl CacheConfig {
    /// Parses configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CacheError::invalid_config("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Cache config not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    /// Sets whether an empty snapshot is an error.
    pub fn with_empty_is_error(mut self, empty_is_error: bool) -> Self {
        self.empty_is_error = empty_is_error;
        self
    }

    /// Sets the construction concurrency limit.
    pub fn with_max_concurrent_constructions(mut self, limit: usize) -> Self {
        self.max_concurrent_constructions = limit;
        self
    }

    /// Sets the release concurrency limit.
    pub fn with_max_concurrent_releases(mut self, limit: usize) -> Self {
        self.max_concurrent_releases = limit;
        self
    }

    /// Validates configuration.
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_concurrent_constructions == 0 {
            return Err(CacheError::invalid_config(
                "max_concurrent_constructions",
                "must be > 0",
            ));
        }

        if self.max_concurrent_releases == 0 {
            return Err(CacheError::invalid_config(
                "max_concurrent_releases",
                "must be > 0",
            ));
        }

        Ok(())
    }
}
