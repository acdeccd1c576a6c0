//! Anchors: identity, ownership and access wrappers around graph entities.
//!
//! Every node, edge and walker lives inside an [`Anchor`]. Anchors refer to
//! each other only by [`AnchorId`]; the memory hierarchy resolves ids, so the
//! graph never holds in-memory pointers between entities.
//!
//! - **Node anchors** keep an ordered adjacency list of incident edge ids
//!   (both directions).
//! - **Edge anchors** keep their `source` and `target` node ids and whether
//!   they are directed.
//! - **Walker anchors** keep the pending visit queue and the scheduler state,
//!   and are transient unless explicitly made persistent.

mod access;
mod archetype;
mod id;
mod record;

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

pub use access::{Access, AccessLevel, AccessOracle, LevelOracle};
pub use archetype::{Archetype, ArchetypeKind, Payload, EDGE, NODE, ROOT, WALKER};
pub use id::{AnchorId, KEY_PREFIX};
pub use record::{content_digest, StoredRecord};

/// Scheduler state of a walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkerStatus {
    /// Allocated, never spawned
    Created,
    /// Has pending visits but is not executing a handler
    Queued,
    /// Executing a dispatch cycle
    Running,
    /// Aborted by `disengage`; terminal
    Disengaged,
    /// Queue drained; terminal
    Done,
}

impl WalkerStatus {
    /// Whether the walker can no longer run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disengaged | Self::Done)
    }
}

impl std::fmt::Display for WalkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Disengaged => write!(f, "disengaged"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Traversal state carried by a walker anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkerState {
    /// Pending visits, front is dispatched next
    pub queue: VecDeque<AnchorId>,
    /// Anchors already dispatched, in order
    #[serde(default)]
    pub path: Vec<AnchorId>,
    /// Anchors this walker skips
    #[serde(default)]
    pub ignores: BTreeSet<AnchorId>,
    pub status: WalkerStatus,
}

impl WalkerState {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            path: Vec::new(),
            ignores: BTreeSet::new(),
            status: WalkerStatus::Created,
        }
    }

    /// Whether `disengage` was called.
    pub fn disengaged(&self) -> bool {
        self.status == WalkerStatus::Disengaged
    }

    /// Enter the terminal disengaged state, dropping every pending visit.
    pub fn disengage(&mut self) {
        self.status = WalkerStatus::Disengaged;
        self.queue.clear();
    }
}

impl Default for WalkerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind-specific part of an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorKind {
    Node {
        edges: Vec<AnchorId>,
    },
    Edge {
        source: AnchorId,
        target: AnchorId,
        directed: bool,
    },
    Walker(WalkerState),
}

/// Persistence and identity wrapper around an archetype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub id: AnchorId,
    #[serde(flatten)]
    pub kind: AnchorKind,
    pub archetype: Payload,
    pub access: Access,
    /// Whether the anchor must outlive the current execution
    pub persistent: bool,
    /// Digest of the last record written to (or read from) a tier
    #[serde(skip)]
    pub hash: Option<String>,
}

impl PartialEq for Anchor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.archetype == other.archetype
            && self.access == other.access
            && self.persistent == other.persistent
    }
}

impl Anchor {
    /// Create a node anchor owned by `owner`.
    pub fn node(archetype: Payload, owner: AnchorId) -> Self {
        Self::with_kind(AnchorKind::Node { edges: Vec::new() }, archetype, owner, true)
    }

    /// Create the root node of `root_id`, owned by itself.
    pub fn root(root_id: AnchorId) -> Self {
        let mut anchor = Self::node(Payload::new(ROOT), root_id);
        anchor.id = root_id;
        anchor
    }

    /// Create an edge anchor between two nodes.
    pub fn edge(
        archetype: Payload,
        owner: AnchorId,
        source: AnchorId,
        target: AnchorId,
        directed: bool,
    ) -> Self {
        Self::with_kind(
            AnchorKind::Edge {
                source,
                target,
                directed,
            },
            archetype,
            owner,
            true,
        )
    }

    /// Create a transient walker anchor.
    pub fn walker(archetype: Payload, owner: AnchorId) -> Self {
        Self::with_kind(AnchorKind::Walker(WalkerState::new()), archetype, owner, false)
    }

    fn with_kind(kind: AnchorKind, archetype: Payload, owner: AnchorId, persistent: bool) -> Self {
        Self {
            id: AnchorId::new(),
            kind,
            archetype,
            access: Access::owned_by(owner),
            persistent,
            hash: None,
        }
    }

    /// Set whether the anchor is persisted on commit.
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Archetype class name.
    pub fn type_name(&self) -> &str {
        &self.archetype.type_name
    }

    /// Entity family of this anchor.
    pub fn archetype_kind(&self) -> ArchetypeKind {
        match self.kind {
            AnchorKind::Node { .. } => ArchetypeKind::Node,
            AnchorKind::Edge { .. } => ArchetypeKind::Edge,
            AnchorKind::Walker(_) => ArchetypeKind::Walker,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self.kind, AnchorKind::Node { .. })
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, AnchorKind::Edge { .. })
    }

    pub fn is_walker(&self) -> bool {
        matches!(self.kind, AnchorKind::Walker(_))
    }

    /// Incident edge ids of a node; empty for edges and walkers.
    pub fn edges(&self) -> &[AnchorId] {
        match &self.kind {
            AnchorKind::Node { edges } => edges,
            _ => &[],
        }
    }

    pub fn edges_mut(&mut self) -> Option<&mut Vec<AnchorId>> {
        match &mut self.kind {
            AnchorKind::Node { edges } => Some(edges),
            _ => None,
        }
    }

    /// `(source, target, directed)` of an edge.
    pub fn endpoints(&self) -> Option<(AnchorId, AnchorId, bool)> {
        match self.kind {
            AnchorKind::Edge {
                source,
                target,
                directed,
            } => Some((source, target, directed)),
            _ => None,
        }
    }

    /// The endpoint of this edge opposite to `node`, if `node` is an endpoint.
    pub fn opposite(&self, node: &AnchorId) -> Option<AnchorId> {
        let (source, target, _) = self.endpoints()?;
        if source == *node {
            Some(target)
        } else if target == *node {
            Some(source)
        } else {
            None
        }
    }

    /// Whether this edge has `node` as one of its endpoints.
    pub fn incident_to(&self, node: &AnchorId) -> bool {
        self.opposite(node).is_some()
    }

    pub fn walker_state(&self) -> Option<&WalkerState> {
        match &self.kind {
            AnchorKind::Walker(state) => Some(state),
            _ => None,
        }
    }

    pub fn walker_state_mut(&mut self) -> Option<&mut WalkerState> {
        match &mut self.kind {
            AnchorKind::Walker(state) => Some(state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kinds() {
        let owner = AnchorId::new();
        let a = Anchor::node(Payload::new("A"), owner);
        let b = Anchor::node(Payload::new("B"), owner);
        let e = Anchor::edge(Payload::new(EDGE), owner, a.id, b.id, true);
        let w = Anchor::walker(Payload::new("Visitor"), owner);

        assert!(a.is_node() && a.persistent);
        assert!(e.is_edge() && e.persistent);
        assert!(w.is_walker() && !w.persistent);
        assert_eq!(e.endpoints(), Some((a.id, b.id, true)));
        assert_eq!(e.opposite(&a.id), Some(b.id));
        assert_eq!(e.opposite(&b.id), Some(a.id));
        assert_eq!(e.opposite(&w.id), None);
        assert_eq!(w.walker_state().unwrap().status, WalkerStatus::Created);
    }

    #[test]
    fn test_root_owns_itself() {
        let id = AnchorId::new();
        let root = Anchor::root(id);
        assert_eq!(root.id, id);
        assert_eq!(root.access.root, id);
        assert_eq!(root.type_name(), ROOT);
    }

    #[test]
    fn test_serde_shape_is_flat() {
        let owner = AnchorId::new();
        let mut node = Anchor::node(Payload::new("A").with_field("x", 1), owner);
        node.edges_mut().unwrap().push(AnchorId::new());
        node.hash = Some("ignored".into());

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["kind"], "node");
        assert_eq!(value["edges"].as_array().unwrap().len(), 1);
        assert!(value.get("hash").is_none());

        let back: Anchor = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
        assert_eq!(back.hash, None);
    }

    #[test]
    fn test_walker_state_serializes() {
        let mut walker = Anchor::walker(Payload::new("W"), AnchorId::new());
        let state = walker.walker_state_mut().unwrap();
        state.queue.push_back(AnchorId::new());
        state.ignores.insert(AnchorId::new());
        state.status = WalkerStatus::Queued;

        let back: Anchor = serde_json::from_str(&serde_json::to_string(&walker).unwrap()).unwrap();
        assert_eq!(back, walker);
    }
}
