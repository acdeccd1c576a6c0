//! Access control for anchors.
//!
//! The engine never interprets permission levels itself when merging writes;
//! it asks an [`AccessOracle`]. [`LevelOracle`] is the stock interpretation of
//! the [`Access`] structure stored on every anchor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Anchor, AnchorId};

/// Permission level granted to a root.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    NoAccess,
    Read,
    Connect,
    Write,
}

/// Access list attached to an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    /// Owning root
    pub root: AnchorId,
    /// Level granted to every root
    #[serde(default)]
    pub all: AccessLevel,
    /// Per-root grants, overriding `all`
    #[serde(default)]
    pub roots: BTreeMap<AnchorId, AccessLevel>,
}

impl Access {
    /// Access list owned by `root`, private to it.
    pub fn owned_by(root: AnchorId) -> Self {
        Self {
            root,
            all: AccessLevel::NoAccess,
            roots: BTreeMap::new(),
        }
    }

    /// Grant a level to every root.
    pub fn with_all(mut self, level: AccessLevel) -> Self {
        self.all = level;
        self
    }

    /// Grant a level to a specific root.
    pub fn grant(&mut self, root: AnchorId, level: AccessLevel) {
        self.roots.insert(root, level);
    }

    /// Remove a specific root's grant.
    pub fn revoke(&mut self, root: &AnchorId) {
        self.roots.remove(root);
    }

    /// Effective level for `actor` under this list.
    pub fn level_for(&self, actor: &AnchorId) -> AccessLevel {
        if actor.is_system_root() || *actor == self.root {
            return AccessLevel::Write;
        }
        self.roots.get(actor).copied().unwrap_or(self.all)
    }
}

/// Capability checks consumed by the memory hierarchy and the path resolver.
pub trait AccessOracle: Send + Sync {
    /// May `actor` observe the anchor.
    fn may_read(&self, actor: &AnchorId, anchor: &Anchor) -> bool;

    /// May `actor` change the anchor's adjacency.
    fn may_connect(&self, actor: &AnchorId, anchor: &Anchor) -> bool;

    /// May `actor` change the anchor's payload and access list.
    fn may_write(&self, actor: &AnchorId, anchor: &Anchor) -> bool;
}

/// Oracle that reads the anchor's own [`Access`] list.
///
/// Levels are ordered, so `Write` implies `Connect` implies `Read`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelOracle;

impl AccessOracle for LevelOracle {
    fn may_read(&self, actor: &AnchorId, anchor: &Anchor) -> bool {
        anchor.access.level_for(actor) >= AccessLevel::Read
    }

    fn may_connect(&self, actor: &AnchorId, anchor: &Anchor) -> bool {
        anchor.access.level_for(actor) >= AccessLevel::Connect
    }

    fn may_write(&self, actor: &AnchorId, anchor: &Anchor) -> bool {
        anchor.access.level_for(actor) >= AccessLevel::Write
    }
}
