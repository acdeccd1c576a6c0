//! Edge-reference resolution.
//!
//! A [`Path`] describes one or more hops away from a set of source nodes.
//! Each hop picks a direction, optionally restricts the traversed edges by
//! type and attribute predicates, and optionally restricts the reached nodes.
//! Resolving a path yields a [`Traversal`] in adjacency-list order, with no
//! sorting and no deduplication.
//!
//! ## Example
//!
//! ```rust,ignore
//! use osp_core::path::{Compare, Path};
//!
//! // Nodes two hops away: a `Road` longer than 10, then any `Ferry`
//! let reached = Path::from(here)
//!     .out()
//!     .edge_type("Road")
//!     .edge_where("km", Compare::Gt, 10)
//!     .then()
//!     .edge_type("Ferry")
//!     .resolve(&mut memory)?;
//! ```

use std::cmp::Ordering;

use serde_json::Value;
use tracing::debug;

use crate::anchor::{Anchor, AnchorId, Payload};
use crate::error::Result;
use crate::memory::MemoryHierarchy;

/// Which incident edges of a node a hop follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Edges whose source is the node
    #[default]
    Out,
    /// Edges whose target is the node
    In,
    /// Both
    Any,
}

/// Comparison operator of a [`FieldFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Compare {
    fn accepts(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::Eq, Some(o)) => o == Ordering::Equal,
            (Self::Ne, Some(o)) => o != Ordering::Equal,
            (Self::Ne, None) => true,
            (Self::Lt, Some(o)) => o == Ordering::Less,
            (Self::Le, Some(o)) => o != Ordering::Greater,
            (Self::Gt, Some(o)) => o == Ordering::Greater,
            (Self::Ge, Some(o)) => o != Ordering::Less,
            (_, None) => false,
        }
    }
}

/// `field <op> value` over an archetype's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: Compare,
    pub value: Value,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, op: Compare, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Whether `payload` satisfies the filter. A missing field never does.
    pub fn matches(&self, payload: &Payload) -> bool {
        match payload.get(&self.field) {
            Some(actual) => self.op.accepts(compare_values(actual, &self.value)),
            None => false,
        }
    }
}

/// Order two JSON values of the same family; `None` when incomparable.
///
/// Numbers compare numerically, strings lexicographically. Other values are
/// only ever equal or unequal.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// One step of a path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hop {
    pub direction: Direction,
    /// Accepted edge archetypes; empty accepts any
    pub edge_types: Vec<String>,
    /// Predicates over the traversed edge, AND-combined
    pub edge_filters: Vec<FieldFilter>,
    /// Accepted node archetypes; empty accepts any
    pub node_types: Vec<String>,
    /// Predicates over the reached node, AND-combined
    pub node_filters: Vec<FieldFilter>,
}

impl Hop {
    fn accepts_edge(&self, edge: &Anchor) -> bool {
        accepts(&self.edge_types, &self.edge_filters, edge)
    }

    fn accepts_node(&self, node: &Anchor) -> bool {
        accepts(&self.node_types, &self.node_filters, node)
    }

    /// The node this hop reaches from `from` through `edge`, if the edge can
    /// be followed in this hop's direction.
    fn follow(&self, edge: &Anchor, from: &AnchorId) -> Option<AnchorId> {
        let (source, target, directed) = edge.endpoints()?;
        if !directed || self.direction == Direction::Any {
            return edge.opposite(from);
        }
        match self.direction {
            Direction::Out if source == *from => Some(target),
            Direction::In if target == *from => Some(source),
            _ => None,
        }
    }
}

fn accepts(types: &[String], filters: &[FieldFilter], anchor: &Anchor) -> bool {
    (types.is_empty() || types.iter().any(|t| t == anchor.type_name()))
        && filters.iter().all(|f| f.matches(&anchor.archetype))
}

/// What a resolved path yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    #[default]
    Nodes,
    Edges,
}

/// Multi-hop edge reference rooted at one or more nodes.
///
/// Builder methods configure the current (last) hop; [`Path::then`] starts a
/// new one. The reached nodes of hop *i* are the sources of hop *i + 1*.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    sources: Vec<AnchorId>,
    hops: Vec<Hop>,
    output: Output,
}

impl From<AnchorId> for Path {
    fn from(source: AnchorId) -> Self {
        Self::from_many([source])
    }
}

impl Path {
    /// A one-hop outgoing path from every node in `sources`, in order.
    pub fn from_many(sources: impl IntoIterator<Item = AnchorId>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
            hops: vec![Hop::default()],
            output: Output::Nodes,
        }
    }

    fn hop(&mut self) -> &mut Hop {
        if self.hops.is_empty() {
            self.hops.push(Hop::default());
        }
        let last = self.hops.len() - 1;
        &mut self.hops[last]
    }

    /// Follow outgoing edges.
    pub fn out(mut self) -> Self {
        self.hop().direction = Direction::Out;
        self
    }

    /// Follow incoming edges.
    pub fn inbound(mut self) -> Self {
        self.hop().direction = Direction::In;
        self
    }

    /// Follow edges in either direction.
    pub fn any(mut self) -> Self {
        self.hop().direction = Direction::Any;
        self
    }

    /// Only traverse edges of this archetype (repeatable: any listed type).
    pub fn edge_type(mut self, type_name: impl Into<String>) -> Self {
        self.hop().edge_types.push(type_name.into());
        self
    }

    /// Only traverse edges whose `field` compares to `value` under `op`.
    pub fn edge_where(mut self, field: impl Into<String>, op: Compare, value: impl Into<Value>) -> Self {
        self.hop().edge_filters.push(FieldFilter::new(field, op, value));
        self
    }

    /// Only reach nodes of this archetype (repeatable: any listed type).
    pub fn node_type(mut self, type_name: impl Into<String>) -> Self {
        self.hop().node_types.push(type_name.into());
        self
    }

    /// Only reach nodes whose `field` compares to `value` under `op`.
    pub fn node_where(mut self, field: impl Into<String>, op: Compare, value: impl Into<Value>) -> Self {
        self.hop().node_filters.push(FieldFilter::new(field, op, value));
        self
    }

    /// Start the next hop.
    pub fn then(mut self) -> Self {
        self.hops.push(Hop::default());
        self
    }

    /// Yield the edges traversed by the last hop instead of the nodes reached.
    pub fn edges(mut self) -> Self {
        self.output = Output::Edges;
        self
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn sources(&self) -> &[AnchorId] {
        &self.sources
    }

    /// Resolve against `memory`, promoting anything it touches.
    ///
    /// Anchors the actor may not read, and edges whose far end no longer
    /// exists, are skipped silently.
    pub fn resolve(&self, memory: &mut MemoryHierarchy) -> Result<Traversal> {
        let mut frontier = self.sources.clone();
        let last = self.hops.len().saturating_sub(1);

        for (depth, hop) in self.hops.iter().enumerate() {
            let yield_edges = depth == last && self.output == Output::Edges;
            let mut reached = Vec::new();

            for node_id in &frontier {
                let Some(node) = readable(memory, node_id)? else {
                    continue;
                };
                let incident = node.edges().to_vec();

                for edge_id in incident {
                    let Some(edge) = readable(memory, &edge_id)? else {
                        continue;
                    };
                    if !hop.accepts_edge(edge) {
                        continue;
                    }
                    let Some(far) = hop.follow(edge, node_id) else {
                        continue;
                    };
                    let Some(far_node) = readable(memory, &far)? else {
                        debug!(edge = %edge_id, node = %far, "far endpoint unavailable");
                        continue;
                    };
                    if !hop.accepts_node(far_node) {
                        continue;
                    }
                    reached.push(if yield_edges { edge_id } else { far });
                }
            }
            frontier = reached;
        }

        Ok(Traversal::new(frontier))
    }
}

/// Resident anchor `id`, if it exists and the actor may read it.
fn readable<'m>(memory: &'m mut MemoryHierarchy, id: &AnchorId) -> Result<Option<&'m Anchor>> {
    if !memory.ensure(id)? {
        return Ok(None);
    }
    let memory: &'m MemoryHierarchy = memory;
    Ok(memory
        .get(id)
        .filter(|anchor| memory.oracle().may_read(&memory.actor(), anchor)))
}

/// Ordered result of resolving a [`Path`].
///
/// Consumed by iteration; it cannot be restarted.
#[derive(Debug)]
pub struct Traversal {
    ids: std::vec::IntoIter<AnchorId>,
}

impl Traversal {
    pub fn new(ids: Vec<AnchorId>) -> Self {
        Self { ids: ids.into_iter() }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.len() == 0
    }
}

impl Iterator for Traversal {
    type Item = AnchorId;

    fn next(&mut self) -> Option<AnchorId> {
        self.ids.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for Traversal {}

/// Anything a walker can be sent to: explicit ids or a path to resolve.
#[derive(Debug, Clone)]
pub enum Targets {
    Ids(Vec<AnchorId>),
    Path(Path),
}

impl Targets {
    /// Concrete ids, in order.
    pub fn resolve(self, memory: &mut MemoryHierarchy) -> Result<Vec<AnchorId>> {
        match self {
            Self::Ids(ids) => Ok(ids),
            Self::Path(path) => Ok(path.resolve(memory)?.collect()),
        }
    }
}

impl From<AnchorId> for Targets {
    fn from(id: AnchorId) -> Self {
        Self::Ids(vec![id])
    }
}

impl From<Vec<AnchorId>> for Targets {
    fn from(ids: Vec<AnchorId>) -> Self {
        Self::Ids(ids)
    }
}

impl From<&[AnchorId]> for Targets {
    fn from(ids: &[AnchorId]) -> Self {
        Self::Ids(ids.to_vec())
    }
}

impl<const N: usize> From<[AnchorId; N]> for Targets {
    fn from(ids: [AnchorId; N]) -> Self {
        Self::Ids(ids.to_vec())
    }
}

impl From<Traversal> for Targets {
    fn from(traversal: Traversal) -> Self {
        Self::Ids(traversal.collect())
    }
}

impl From<Path> for Targets {
    fn from(path: Path) -> Self {
        Self::Path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{AccessLevel, Payload};
    use crate::memory::ShelfStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    struct Graph {
        memory: MemoryHierarchy,
    }

    impl Graph {
        fn new() -> Self {
            Self {
                memory: MemoryHierarchy::fallback(Arc::new(ShelfStore::in_memory().unwrap())),
            }
        }

        fn node(&mut self, type_name: &str) -> AnchorId {
            let anchor = Anchor::node(Payload::new(type_name), self.memory.actor());
            let id = anchor.id;
            self.memory.insert(anchor);
            id
        }

        fn edge(&mut self, from: AnchorId, to: AnchorId, payload: Payload, directed: bool) -> AnchorId {
            let anchor = Anchor::edge(payload, self.memory.actor(), from, to, directed);
            let id = anchor.id;
            self.memory.insert(anchor);
            for end in [from, to] {
                self.memory.get_mut(&end).unwrap().edges_mut().unwrap().push(id);
            }
            id
        }

        fn link(&mut self, from: AnchorId, to: AnchorId) -> AnchorId {
            self.edge(from, to, Payload::new("Edge"), true)
        }

        fn resolve(&mut self, path: Path) -> Vec<AnchorId> {
            path.resolve(&mut self.memory).unwrap().collect()
        }
    }

    #[test]
    fn test_outgoing_in_insertion_order() {
        let mut g = Graph::new();
        let root = g.node("Root");
        let b = g.node("City");
        let a = g.node("City");
        g.link(root, b);
        g.link(root, a);

        assert_eq!(g.resolve(Path::from(root)), vec![b, a]);
    }

    #[test]
    fn test_direction() {
        let mut g = Graph::new();
        let a = g.node("A");
        let b = g.node("B");
        g.link(a, b);

        assert_eq!(g.resolve(Path::from(b).out()), Vec::<AnchorId>::new());
        assert_eq!(g.resolve(Path::from(b).inbound()), vec![a]);
        assert_eq!(g.resolve(Path::from(a).any()), vec![b]);
    }

    #[test]
    fn test_undirected_edges_follow_both_ways() {
        let mut g = Graph::new();
        let a = g.node("A");
        let b = g.node("B");
        g.edge(a, b, Payload::new("Edge"), false);

        assert_eq!(g.resolve(Path::from(b).out()), vec![a]);
        assert_eq!(g.resolve(Path::from(a).inbound()), vec![b]);
    }

    #[test]
    fn test_edge_type_and_filters() {
        let mut g = Graph::new();
        let a = g.node("Town");
        let near = g.node("Town");
        let far = g.node("Town");
        let boat = g.node("Town");
        g.edge(a, near, Payload::new("Road").with_field("km", 4), true);
        g.edge(a, far, Payload::new("Road").with_field("km", 40), true);
        g.edge(a, boat, Payload::new("Ferry").with_field("km", 12), true);

        let roads = Path::from(a).edge_type("Road");
        assert_eq!(g.resolve(roads.clone()), vec![near, far]);
        assert_eq!(g.resolve(roads.clone().edge_where("km", Compare::Gt, 10)), vec![far]);
        assert_eq!(
            g.resolve(
                Path::from(a)
                    .edge_where("km", Compare::Ge, 4)
                    .edge_where("km", Compare::Lt, 40)
            ),
            vec![near, boat]
        );
        assert_eq!(g.resolve(Path::from(a).edge_where("km", Compare::Ne, 40)), vec![near, boat]);
        assert_eq!(g.resolve(Path::from(a).edge_where("toll", Compare::Eq, true)), Vec::<AnchorId>::new());
    }

    #[test]
    fn test_edge_output() {
        let mut g = Graph::new();
        let a = g.node("A");
        let b = g.node("B");
        let c = g.node("C");
        let ab = g.link(a, b);
        let ac = g.link(a, c);

        assert_eq!(g.resolve(Path::from(a).edges()), vec![ab, ac]);
    }

    #[test]
    fn test_hops_compose_not_union() {
        let mut g = Graph::new();
        let a = g.node("A");
        let b = g.node("B");
        let c = g.node("C");
        let d = g.node("D");
        g.edge(a, b, Payload::new("T1"), true);
        g.edge(b, c, Payload::new("T2"), true);
        g.edge(b, d, Payload::new("T1"), true);
        g.edge(a, d, Payload::new("T2"), true);

        let path = Path::from(a).edge_type("T1").then().edge_type("T2");
        assert_eq!(g.resolve(path), vec![c]);
    }

    #[test]
    fn test_no_dedup_across_sources() {
        let mut g = Graph::new();
        let a = g.node("A");
        let b = g.node("B");
        let shared = g.node("C");
        g.link(a, shared);
        g.link(b, shared);

        assert_eq!(g.resolve(Path::from_many([a, b])), vec![shared, shared]);
    }

    #[test]
    fn test_node_filters() {
        let mut g = Graph::new();
        let a = g.node("A");
        let small = g.node("City");
        let big = g.node("City");
        let other = g.node("Lake");
        g.memory.get_mut(&small).unwrap().archetype.set("pop", 10);
        g.memory.get_mut(&big).unwrap().archetype.set("pop", 1000);
        g.memory.get_mut(&other).unwrap().archetype.set("pop", 5000);
        g.link(a, small);
        g.link(a, big);
        g.link(a, other);

        assert_eq!(
            g.resolve(Path::from(a).node_type("City").node_where("pop", Compare::Ge, 100)),
            vec![big]
        );
    }

    #[test]
    fn test_unreadable_anchors_are_skipped() {
        let mut g = Graph::new();
        let owner = AnchorId::new();
        let a = g.node("A");
        let open = g.node("B");
        let hidden = g.node("B");
        g.link(a, open);
        g.link(a, hidden);
        for id in [a, open, hidden] {
            let anchor = g.memory.get_mut(&id).unwrap();
            anchor.access.root = owner;
            anchor.access.all = AccessLevel::Read;
        }
        let access = &mut g.memory.get_mut(&hidden).unwrap().access;
        access.all = AccessLevel::NoAccess;

        // Edges were created by the system root and stay private to it
        g.memory.set_actor(AnchorId::new());
        assert!(g.resolve(Path::from(a)).is_empty());

        for id in g.memory.local().ids() {
            let anchor = g.memory.get_mut(&id).unwrap();
            if anchor.is_edge() {
                anchor.access.all = AccessLevel::Read;
            }
        }
        assert_eq!(g.resolve(Path::from(a)), vec![open]);
    }

    #[test]
    fn test_traversal_is_consumed() {
        let mut traversal = Traversal::new(vec![AnchorId::new(), AnchorId::new()]);
        assert_eq!(traversal.len(), 2);
        traversal.next();
        traversal.next();
        assert!(traversal.is_empty());
        assert_eq!(traversal.next(), None);
    }

    #[test]
    fn test_compare_values() {
        let filter = FieldFilter::new("name", Compare::Lt, "m");
        assert!(filter.matches(&Payload::new("X").with_field("name", "a")));
        assert!(!filter.matches(&Payload::new("X").with_field("name", "z")));
        // Mismatched families are unequal and unordered
        let payload = Payload::new("X").with_field("name", json!(3));
        assert!(!filter.matches(&payload));
        assert!(FieldFilter::new("name", Compare::Ne, "m").matches(&payload));
        assert!(FieldFilter::new("v", Compare::Eq, json!(null)).matches(&Payload::new("X").with_field("v", json!(null))));
        assert!(FieldFilter::new("v", Compare::Le, 2.5).matches(&Payload::new("X").with_field("v", 2)));
    }
}
