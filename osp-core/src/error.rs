//! Error types for osp-core.

use thiserror::Error;

use crate::anchor::AnchorId;

/// Result type alias using osp-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running walkers or persisting anchors.
#[derive(Error, Debug)]
pub enum Error {
    /// A storage tier failed (shelf, cache, or document store)
    #[error("Storage error ({tier}): {message}")]
    Storage { tier: &'static str, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The acting root lacks a capability on an anchor
    #[error("Access denied: {actor} may not {capability} {anchor}")]
    AccessDenied {
        actor: AnchorId,
        anchor: AnchorId,
        capability: &'static str,
    },

    /// A queued visit target could not be found in any tier
    #[error("Visit target {id} cannot be resolved in any tier")]
    UnresolvableTarget { id: AnchorId },

    /// An anchor referenced by an operation does not exist
    #[error("Anchor not found: {0}")]
    NotFound(AnchorId),

    /// An archetype name that was never declared in the registry
    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),

    /// An anchor's archetype does not match what the caller asked for
    #[error("Archetype mismatch: expected {expected}, found {found}")]
    InvalidArchetype { expected: String, found: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error for the named tier.
    pub fn storage(tier: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            tier,
            message: message.into(),
        }
    }

    /// Create an access-denied error.
    pub fn access_denied(actor: &AnchorId, anchor: &AnchorId, capability: &'static str) -> Self {
        Self::AccessDenied {
            actor: *actor,
            anchor: *anchor,
            capability,
        }
    }

    /// Create an archetype mismatch error.
    pub fn invalid_archetype(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::InvalidArchetype {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::storage("shelf", e.to_string())
    }
}
