//! Anchor identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix used for anchor keys in the fast cache and the shelf store.
pub const KEY_PREFIX: &str = "anchor:";

/// Globally unique, immutable identifier of an anchor.
///
/// The same id is the primary key in every tier of the memory hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    /// Generate a new random anchor ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The id of the system root (the nil UUID).
    pub fn system_root() -> Self {
        Self(Uuid::nil())
    }

    /// Create from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Whether this is the system root id.
    pub fn is_system_root(&self) -> bool {
        self.0.is_nil()
    }

    /// Key under which this anchor is stored in key-value tiers.
    pub fn storage_key(&self) -> String {
        format!("{}{}", KEY_PREFIX, self.0)
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AnchorId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.strip_prefix(KEY_PREFIX).unwrap_or(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_round_trips_through_from_str() {
        let id = AnchorId::new();
        let key = id.storage_key();

        assert!(key.starts_with("anchor:"));
        assert_eq!(key.parse::<AnchorId>().unwrap(), id);
    }

    #[test]
    fn test_system_root_is_nil() {
        assert!(AnchorId::system_root().is_system_root());
        assert!(!AnchorId::new().is_system_root());
    }
}
