//! Per-context local cache: the authoritative tier for a running execution.

use std::collections::{HashMap, HashSet};

use crate::anchor::{Anchor, AnchorId};

/// Anchors resident in one execution context, plus the GC set.
#[derive(Debug, Clone, Default)]
pub struct LocalCache {
    anchors: HashMap<AnchorId, Anchor>,
    gc: HashSet<AnchorId>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AnchorId) -> Option<&Anchor> {
        self.anchors.get(id)
    }

    pub fn get_mut(&mut self, id: &AnchorId) -> Option<&mut Anchor> {
        self.anchors.get_mut(id)
    }

    pub fn contains(&self, id: &AnchorId) -> bool {
        self.anchors.contains_key(id)
    }

    /// Make an anchor resident, replacing any previous copy.
    pub fn insert(&mut self, anchor: Anchor) {
        self.gc.remove(&anchor.id);
        self.anchors.insert(anchor.id, anchor);
    }

    pub fn remove(&mut self, id: &AnchorId) -> Option<Anchor> {
        self.anchors.remove(id)
    }

    /// Evict the anchor and schedule its deletion from every tier.
    pub fn mark_gc(&mut self, id: AnchorId) {
        self.anchors.remove(&id);
        self.gc.insert(id);
    }

    pub fn is_marked(&self, id: &AnchorId) -> bool {
        self.gc.contains(id)
    }

    pub fn unmark(&mut self, id: &AnchorId) -> bool {
        self.gc.remove(id)
    }

    /// Current GC set.
    pub fn marked(&self) -> &HashSet<AnchorId> {
        &self.gc
    }

    /// Drain the GC set.
    pub fn take_gc(&mut self) -> HashSet<AnchorId> {
        std::mem::take(&mut self.gc)
    }

    /// Ids of every resident anchor.
    pub fn ids(&self) -> Vec<AnchorId> {
        self.anchors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
