//! Execution contexts: one per request or session.
//!
//! A context owns a [`MemoryHierarchy`] (and so its own local cache), shares
//! an immutable [`Registry`], and acts on behalf of one root. Lifecycle is
//! explicit: [`ExecutionContext::open`] → graph operations and walker spawns
//! → [`ExecutionContext::commit`] or [`ExecutionContext::close`]. Dropping a
//! context without closing it discards uncommitted changes.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::anchor::{
    Anchor, AnchorId, AnchorKind, Archetype, ArchetypeKind, Payload, WalkerState, WalkerStatus, NODE,
    ROOT, WALKER,
};
use crate::error::{Error, Result};
use crate::memory::{CommitStats, MemoryHierarchy};
use crate::path::Targets;
use crate::walker::{self, Registry};

#[derive(Debug, Clone, Copy)]
enum Capability {
    Read,
    Connect,
    Write,
}

impl Capability {
    fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Connect => "connect",
            Self::Write => "write",
        }
    }
}

/// Explicitly passed state for running walkers against the graph.
pub struct ExecutionContext {
    memory: MemoryHierarchy,
    registry: Arc<Registry>,
    root: AnchorId,
    reports: Vec<Value>,
}

impl ExecutionContext {
    /// Open a context acting as `root`, or as the system root when `None`.
    ///
    /// A root that exists in no tier is created and committed on the spot.
    pub fn open(
        mut memory: MemoryHierarchy,
        registry: Arc<Registry>,
        root: Option<AnchorId>,
    ) -> Result<Self> {
        let root = root.unwrap_or_else(AnchorId::system_root);
        memory.set_actor(root);
        if !memory.ensure(&root)? {
            info!(root = %root, "registering new root");
            memory.insert(Anchor::root(root));
            memory.commit(Some(&root))?;
        }
        Ok(Self {
            memory,
            registry,
            root,
            reports: Vec::new(),
        })
    }

    /// Root node of this context.
    pub fn root(&self) -> AnchorId {
        self.root
    }

    /// Identity used for permission checks.
    pub fn actor(&self) -> AnchorId {
        self.memory.actor()
    }

    pub fn memory(&self) -> &MemoryHierarchy {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryHierarchy {
        &mut self.memory
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Reports produced so far by every walker in this context.
    pub fn reports(&self) -> &[Value] {
        &self.reports
    }

    pub fn take_reports(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.reports)
    }

    pub fn report(&mut self, value: impl Into<Value>) {
        self.reports.push(value.into());
    }

    /// Write every change made in this context.
    pub fn commit(&mut self) -> Result<CommitStats> {
        self.memory.commit(None)
    }

    /// Commit and end the context.
    pub fn close(mut self) -> Result<CommitStats> {
        let stats = self.commit()?;
        debug!(root = %self.root, ?stats, "context closed");
        Ok(stats)
    }

    // ==================== Lookup ====================

    /// Resident anchor `id` after checking that the actor holds `capability`.
    fn checked(&mut self, id: &AnchorId, capability: Capability) -> Result<&Anchor> {
        if !self.memory.ensure(id)? {
            return Err(Error::NotFound(*id));
        }
        let memory = &self.memory;
        let anchor = memory.get(id).ok_or(Error::NotFound(*id))?;
        let actor = memory.actor();
        let allowed = match capability {
            Capability::Read => memory.oracle().may_read(&actor, anchor),
            Capability::Connect => memory.oracle().may_connect(&actor, anchor),
            Capability::Write => memory.oracle().may_write(&actor, anchor),
        };
        if allowed {
            Ok(anchor)
        } else {
            Err(Error::access_denied(&actor, id, capability.as_str()))
        }
    }

    /// Readable anchor `id`, or `None` if it exists nowhere.
    pub fn find(&mut self, id: &AnchorId) -> Result<Option<&Anchor>> {
        if !self.memory.ensure(id)? {
            return Ok(None);
        }
        self.checked(id, Capability::Read).map(Some)
    }

    /// Concrete ids of `targets`, resolving paths against this context.
    pub fn resolve(&mut self, targets: impl Into<Targets>) -> Result<Vec<AnchorId>> {
        targets.into().resolve(&mut self.memory)
    }

    pub fn field(&mut self, id: AnchorId, name: &str) -> Result<Option<Value>> {
        Ok(self.checked(&id, Capability::Read)?.archetype.get(name).cloned())
    }

    pub fn set_field(&mut self, id: AnchorId, name: &str, value: impl Into<Value>) -> Result<()> {
        self.checked(&id, Capability::Write)?;
        let anchor = self.memory.get_mut(&id).ok_or(Error::NotFound(id))?;
        anchor.archetype.set(name, value);
        Ok(())
    }

    /// Typed payload of `id`.
    pub fn load<T: Archetype>(&mut self, id: AnchorId) -> Result<T> {
        T::from_payload(&self.checked(&id, Capability::Read)?.archetype)
    }

    /// Replace the payload of `id` with `value`, which must be of the same archetype.
    pub fn save<T: Archetype>(&mut self, id: AnchorId, value: &T) -> Result<()> {
        let payload = value.to_payload()?;
        let current = self.checked(&id, Capability::Write)?.type_name();
        if current != payload.type_name {
            return Err(Error::invalid_archetype(current, payload.type_name));
        }
        let anchor = self.memory.get_mut(&id).ok_or(Error::NotFound(id))?;
        anchor.archetype = payload;
        Ok(())
    }

    // ==================== Graph construction ====================

    fn check_kind(&self, type_name: &str, kind: ArchetypeKind) -> Result<()> {
        match self.registry.kind_of(type_name) {
            Some(declared) if declared != kind => {
                Err(Error::invalid_archetype(kind.base_type(), type_name))
            }
            _ => Ok(()),
        }
    }

    /// Create a persistent node owned by the actor.
    pub fn create_node(&mut self, payload: Payload) -> Result<AnchorId> {
        self.check_kind(&payload.type_name, ArchetypeKind::Node)?;
        let anchor = Anchor::node(payload, self.actor());
        let id = anchor.id;
        debug!(anchor = %id, type_name = anchor.type_name(), "created node");
        self.memory.insert(anchor);
        Ok(id)
    }

    /// Create a node from a typed archetype.
    pub fn create<T: Archetype>(&mut self, value: &T) -> Result<AnchorId> {
        if T::KIND != ArchetypeKind::Node {
            return Err(Error::invalid_archetype(NODE, T::NAME));
        }
        self.create_node(value.to_payload()?)
    }

    /// Connect two nodes with a new edge, appending it to both adjacency lists.
    pub fn connect(
        &mut self,
        source: AnchorId,
        target: AnchorId,
        edge: Payload,
        directed: bool,
    ) -> Result<AnchorId> {
        self.check_kind(&edge.type_name, ArchetypeKind::Edge)?;
        for node in [source, target] {
            let anchor = self.checked(&node, Capability::Connect)?;
            if !anchor.is_node() {
                return Err(Error::invalid_archetype(NODE, anchor.type_name()));
            }
        }

        let anchor = Anchor::edge(edge, self.actor(), source, target, directed);
        let id = anchor.id;
        self.memory.insert(anchor);
        for node in [source, target] {
            if let Some(edges) = self.memory.get_mut(&node).and_then(Anchor::edges_mut) {
                if !edges.contains(&id) {
                    edges.push(id);
                }
            }
        }
        debug!(edge = %id, source = %source, target = %target, "connected");
        Ok(id)
    }

    /// Destroy every edge from `source` to `target` (either way if
    /// undirected), optionally only those of `edge_type`.
    pub fn disconnect(
        &mut self,
        source: AnchorId,
        target: AnchorId,
        edge_type: Option<&str>,
    ) -> Result<usize> {
        let incident = self.checked(&source, Capability::Connect)?.edges().to_vec();
        let mut removed = 0;
        for edge_id in incident {
            let Some(edge) = self.memory.find_by_id(&edge_id)? else {
                continue;
            };
            let Some((from, to, directed)) = edge.endpoints() else {
                continue;
            };
            let links =
                (from == source && to == target) || (!directed && from == target && to == source);
            if !links || edge_type.is_some_and(|t| t != edge.type_name()) {
                continue;
            }
            self.destroy(edge_id)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Destroy an anchor at the next commit.
    ///
    /// Destroying a node destroys its incident edges too; destroying an edge
    /// detaches it from both endpoints. Roots cannot be destroyed.
    pub fn destroy(&mut self, id: AnchorId) -> Result<()> {
        let actor = self.actor();
        if id == self.root || id.is_system_root() {
            return Err(Error::access_denied(&actor, &id, "destroy"));
        }
        let anchor = self.checked(&id, Capability::Write)?.clone();
        if anchor.type_name() == ROOT {
            return Err(Error::access_denied(&actor, &id, "destroy"));
        }

        match &anchor.kind {
            AnchorKind::Node { edges } => {
                for edge_id in edges {
                    if let Some(edge) = self.memory.find_by_id(edge_id)?.cloned() {
                        self.detach(&edge)?;
                        self.memory.mark_gc(*edge_id);
                    }
                }
            }
            AnchorKind::Edge { .. } => self.detach(&anchor)?,
            AnchorKind::Walker(_) => {}
        }
        self.memory.mark_gc(id);
        debug!(anchor = %id, "destroyed");
        Ok(())
    }

    fn detach(&mut self, edge: &Anchor) -> Result<()> {
        let Some((source, target, _)) = edge.endpoints() else {
            return Ok(());
        };
        for node in [source, target] {
            if !self.memory.ensure(&node)? {
                continue;
            }
            if let Some(edges) = self.memory.get_mut(&node).and_then(Anchor::edges_mut) {
                edges.retain(|e| *e != edge.id);
            }
        }
        Ok(())
    }

    /// Set the same fields on every anchor of `targets`.
    ///
    /// Anchors the actor may not write are skipped. Returns how many were updated.
    pub fn assign(
        &mut self,
        targets: impl Into<Targets>,
        fields: &[(&str, Value)],
    ) -> Result<usize> {
        let ids = self.resolve(targets)?;
        let actor = self.actor();
        let mut updated = 0;
        for id in ids {
            if !self.memory.ensure(&id)? {
                continue;
            }
            let writable = self
                .memory
                .get(&id)
                .is_some_and(|anchor| self.memory.oracle().may_write(&actor, anchor));
            if !writable {
                debug!(anchor = %id, actor = %actor, "assign skipped, not writable");
                continue;
            }
            if let Some(anchor) = self.memory.get_mut(&id) {
                for (name, value) in fields {
                    anchor.archetype.set(*name, value.clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    // ==================== Walkers ====================

    pub(crate) fn walker_state_mut(&mut self, walker: AnchorId) -> Result<&mut WalkerState> {
        self.memory
            .get_mut(&walker)
            .and_then(Anchor::walker_state_mut)
            .ok_or(Error::NotFound(walker))
    }

    /// Run a walker of `walker_type` from `target` (the root when `None`).
    ///
    /// On success every change is committed and the serialized result is
    /// returned: walker type, final fields, dispatch path, reports and
    /// terminal status. On error the local cache is restored to its state
    /// before the spawn, so nothing the walker did reaches a commit.
    pub fn spawn_walker(
        &mut self,
        walker_type: &str,
        fields: Map<String, Value>,
        target: Option<AnchorId>,
    ) -> Result<Value> {
        match self.registry.kind_of(walker_type) {
            Some(ArchetypeKind::Walker) => {}
            Some(_) => return Err(Error::invalid_archetype(WALKER, walker_type)),
            None => return Err(Error::UnknownArchetype(walker_type.to_string())),
        }

        let start = target.unwrap_or(self.root);
        let snapshot = self.memory.snapshot();
        let mark = self.reports.len();

        let anchor = Anchor::walker(
            Payload {
                type_name: walker_type.to_string(),
                fields,
            },
            self.actor(),
        );
        let walker_id = anchor.id;
        self.memory.insert(anchor);

        let status = match walker::spawn(self, walker_id, start) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    walker = %walker_id,
                    walker_type,
                    error = %e,
                    "walker failed, discarding its changes"
                );
                self.memory.restore(snapshot);
                self.reports.truncate(mark);
                return Err(e);
            }
        };

        let result = self.walker_result(walker_id, status, mark)?;
        self.memory.evict(&walker_id);
        self.commit()?;
        Ok(result)
    }

    /// Run a typed walker; see [`ExecutionContext::spawn_walker`].
    pub fn spawn<W: Archetype>(&mut self, walker: &W, target: Option<AnchorId>) -> Result<Value> {
        if W::KIND != ArchetypeKind::Walker {
            return Err(Error::invalid_archetype(WALKER, W::NAME));
        }
        self.spawn_walker(W::NAME, walker.to_payload()?.fields, target)
    }

    fn walker_result(&self, walker: AnchorId, status: WalkerStatus, mark: usize) -> Result<Value> {
        let anchor = self.memory.get(&walker).ok_or(Error::NotFound(walker))?;
        let path = anchor.walker_state().map(|s| s.path.clone()).unwrap_or_default();
        Ok(json!({
            "walker": anchor.type_name(),
            "fields": anchor.archetype.fields,
            "path": path,
            "reports": &self.reports[mark..],
            "status": status,
        }))
    }
}
