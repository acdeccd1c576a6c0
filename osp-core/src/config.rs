//! Connection settings for the memory hierarchy.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Connection settings for every persistent tier.
///
/// Each setting is independently overridable from the environment; anything
/// unset keeps its development default. A set but malformed value is an
/// error rather than a silent fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Document store connection string.
    pub database_url: String,
    /// Document store database name.
    pub database_name: String,
    /// Document store collection holding anchors.
    pub collection: String,
    /// Fast cache connection string.
    pub redis_url: String,
    /// Shelf file for the fallback configuration.
    pub shelf_path: PathBuf,
    /// Liveness probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_url: "mongodb://localhost:27017".to_string(),
            database_name: "osp".to_string(),
            collection: "anchors".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            shelf_path: expand_path("~/.osp/shelf.db"),
            probe_timeout_ms: 500,
        }
    }
}

impl MemoryConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let probe_timeout_ms = match lookup("OSP_PROBE_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Config(format!("OSP_PROBE_TIMEOUT_MS must be milliseconds, got {raw:?}"))
            })?,
            None => defaults.probe_timeout_ms,
        };
        Ok(Self {
            database_url: lookup("OSP_DATABASE_URL").unwrap_or(defaults.database_url),
            database_name: lookup("OSP_DATABASE_NAME").unwrap_or(defaults.database_name),
            collection: lookup("OSP_COLLECTION").unwrap_or(defaults.collection),
            redis_url: lookup("OSP_REDIS_URL").unwrap_or(defaults.redis_url),
            shelf_path: lookup("OSP_SHELF_PATH")
                .map(|p| expand_path(&p))
                .unwrap_or(defaults.shelf_path),
            probe_timeout_ms,
        })
    }

    /// Override the shelf path.
    pub fn with_shelf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.shelf_path = path.into();
        self
    }

    /// Liveness probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
