//! Tiered memory: local cache over either the remote pair or the shelf.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::anchor::{AccessOracle, Anchor, AnchorId, AnchorKind, LevelOracle, StoredRecord};
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::memory::local::LocalCache;
use crate::memory::shelf::ShelfStore;
use crate::memory::tier::RemoteTiers;

/// Outcome of a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Anchors written to the active tier(s)
    pub written: usize,
    /// Anchors whose hash matched the last write
    pub unchanged: usize,
    /// Anchors skipped because they failed to serialize or would dangle
    pub skipped: usize,
    /// Anchors deleted from the active tier(s)
    pub deleted: usize,
}

/// Where a read or write lands for one call.
enum Backend<'a> {
    Remote(&'a RemoteTiers),
    Shelf(&'a ShelfStore),
}

impl Backend<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Shelf(_) => "shelf",
        }
    }

    fn load_many(&self, ids: &[AnchorId]) -> Result<HashMap<String, StoredRecord>> {
        let records = match self {
            Self::Remote(remote) => remote.documents.find_many(ids)?,
            Self::Shelf(shelf) => {
                let mut records = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(record) = shelf.get(id)? {
                        records.push(record);
                    }
                }
                records
            }
        };
        Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect())
    }

    fn store_many(&self, records: &[StoredRecord]) -> Result<()> {
        match self {
            Self::Remote(remote) => {
                remote.documents.upsert_many(records)?;
                remote.cache.set_many(records)
            }
            Self::Shelf(shelf) => shelf.put_many(records),
        }
    }

    fn delete_many(&self, ids: &[AnchorId]) -> Result<()> {
        match self {
            Self::Remote(remote) => {
                for id in ids {
                    remote.cache.delete(id)?;
                }
                remote.documents.delete_many(ids)
            }
            Self::Shelf(shelf) => shelf.atomically(|s| {
                for id in ids {
                    s.delete(id)?;
                }
                Ok(())
            }),
        }
    }
}

/// Memory hierarchy for one execution context.
///
/// Composes a [`LocalCache`] with exactly one persistent configuration,
/// chosen by a liveness probe at construction:
///
/// - **remote**: fast cache + document store, used together;
/// - **fallback**: the embedded [`ShelfStore`].
///
/// In the remote configuration every call probes the cache again and, if it
/// is down, serves that one call from the shelf instead of failing.
pub struct MemoryHierarchy {
    local: LocalCache,
    remote: Option<RemoteTiers>,
    shelf: Arc<ShelfStore>,
    oracle: Arc<dyn AccessOracle>,
    actor: AnchorId,
    probe_timeout: Duration,
}

impl MemoryHierarchy {
    /// Fallback configuration over `shelf`.
    pub fn fallback(shelf: Arc<ShelfStore>) -> Self {
        Self {
            local: LocalCache::new(),
            remote: None,
            shelf,
            oracle: Arc::new(LevelOracle),
            actor: AnchorId::system_root(),
            probe_timeout: Duration::from_millis(500),
        }
    }

    /// Remote configuration if both remote tiers answer the probe, otherwise
    /// the fallback configuration over `shelf`.
    pub fn with_remote(remote: RemoteTiers, shelf: Arc<ShelfStore>, probe_timeout: Duration) -> Self {
        let mut memory = Self::fallback(shelf);
        memory.probe_timeout = probe_timeout;
        if remote.cache.ping(probe_timeout) && remote.documents.ping(probe_timeout) {
            info!("remote tiers live, using cache + document store");
            memory.remote = Some(remote);
        } else {
            warn!("remote tiers unreachable at startup, using shelf store");
        }
        memory
    }

    /// Build from configuration, probing the remote tiers once.
    pub fn connect(config: &MemoryConfig) -> Result<Self> {
        let shelf = Arc::new(ShelfStore::open(&config.shelf_path)?);
        Ok(match open_remote(config) {
            Some(remote) => Self::with_remote(remote, shelf, config.probe_timeout()),
            None => {
                let mut memory = Self::fallback(shelf);
                memory.probe_timeout = config.probe_timeout();
                memory
            }
        })
    }

    /// Use a different access oracle.
    pub fn with_oracle(mut self, oracle: Arc<dyn AccessOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// A hierarchy for another context: same tiers and oracle, empty local cache.
    pub fn fork(&self) -> Self {
        Self {
            local: LocalCache::new(),
            remote: self.remote.clone(),
            shelf: Arc::clone(&self.shelf),
            oracle: Arc::clone(&self.oracle),
            actor: AnchorId::system_root(),
            probe_timeout: self.probe_timeout,
        }
    }

    /// Whether the remote configuration was selected at construction.
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Identity used for permission checks.
    pub fn actor(&self) -> AnchorId {
        self.actor
    }

    pub fn set_actor(&mut self, actor: AnchorId) {
        self.actor = actor;
    }

    pub fn oracle(&self) -> &dyn AccessOracle {
        self.oracle.as_ref()
    }

    pub fn shelf(&self) -> &ShelfStore {
        &self.shelf
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    fn backend(&self) -> Backend<'_> {
        match &self.remote {
            Some(remote) if remote.ping(self.probe_timeout) => Backend::Remote(remote),
            Some(_) => {
                warn!("cache probe failed, serving call from shelf store");
                Backend::Shelf(&self.shelf)
            }
            None => Backend::Shelf(&self.shelf),
        }
    }

    // ==================== Reads ====================

    /// Find an anchor in any tier, promoting it into the local cache.
    ///
    /// A miss everywhere (or an anchor pending deletion) is `Ok(None)`.
    pub fn find_by_id(&mut self, id: &AnchorId) -> Result<Option<&Anchor>> {
        if self.ensure(id)? {
            Ok(self.local.get(id))
        } else {
            Ok(None)
        }
    }

    /// Make `id` resident if it exists anywhere; returns whether it does.
    pub fn ensure(&mut self, id: &AnchorId) -> Result<bool> {
        if self.local.is_marked(id) {
            return Ok(false);
        }
        if self.local.contains(id) {
            return Ok(true);
        }
        match self.fetch(id)? {
            Some(anchor) => {
                self.local.insert(anchor);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn fetch(&self, id: &AnchorId) -> Result<Option<Anchor>> {
        let record = match self.backend() {
            Backend::Remote(remote) => {
                if let Some(record) = remote.cache.get(id)? {
                    debug!(anchor = %id, "promoted from cache");
                    Some(record)
                } else if let Some(record) = remote.documents.find_one(id)? {
                    debug!(anchor = %id, "promoted from document store");
                    remote.cache.set(&record)?;
                    Some(record)
                } else {
                    None
                }
            }
            Backend::Shelf(shelf) => {
                let record = shelf.get(id)?;
                if record.is_some() {
                    debug!(anchor = %id, "promoted from shelf");
                }
                record
            }
        };
        record.as_ref().map(Anchor::from_record).transpose()
    }

    /// Resident anchor, without touching other tiers.
    pub fn get(&self, id: &AnchorId) -> Option<&Anchor> {
        self.local.get(id)
    }

    pub fn get_mut(&mut self, id: &AnchorId) -> Option<&mut Anchor> {
        self.local.get_mut(id)
    }

    /// Make a newly created anchor resident.
    pub fn insert(&mut self, anchor: Anchor) {
        self.local.insert(anchor);
    }

    /// Drop a resident anchor without scheduling any tier deletion.
    pub fn evict(&mut self, id: &AnchorId) -> Option<Anchor> {
        self.local.remove(id)
    }

    /// Schedule an anchor for deletion from every tier at the next commit.
    pub fn mark_gc(&mut self, id: AnchorId) {
        self.local.mark_gc(id);
    }

    pub fn is_marked(&self, id: &AnchorId) -> bool {
        self.local.is_marked(id)
    }

    /// Copy of the local tier, for [`MemoryHierarchy::restore`].
    pub fn snapshot(&self) -> LocalCache {
        self.local.clone()
    }

    /// Throw away local changes made since `snapshot`.
    pub fn restore(&mut self, snapshot: LocalCache) {
        self.local = snapshot;
    }

    // ==================== Writes ====================

    /// Commit one anchor, or everything resident when `target` is `None`.
    ///
    /// With no target the GC set is flushed first, then every other resident
    /// anchor is written through the merge policy in one batch.
    pub fn commit(&mut self, target: Option<&AnchorId>) -> Result<CommitStats> {
        match target {
            Some(id) if self.local.is_marked(id) => {
                let mut stats = CommitStats::default();
                self.backend().delete_many(&[*id])?;
                self.local.unmark(id);
                stats.deleted = 1;
                Ok(stats)
            }
            Some(id) => {
                self.commit_batch(&[*id])
            }
            None => {
                let doomed = self.local.take_gc();
                let doomed_ids: Vec<AnchorId> = doomed.iter().copied().collect();
                if !doomed_ids.is_empty() {
                    if let Err(e) = self.backend().delete_many(&doomed_ids) {
                        // Keep them scheduled so the next commit retries
                        for id in doomed_ids {
                            self.local.mark_gc(id);
                        }
                        return Err(e);
                    }
                    debug!(count = doomed.len(), "flushed gc set");
                }
                let ids = self.local.ids();
                let mut stats = self.write_batch(&ids, &doomed)?;
                stats.deleted = doomed.len();
                Ok(stats)
            }
        }
    }

    /// Bulk commit: one stored-copy fetch and one multi-document write for
    /// the whole batch.
    pub fn commit_batch(&mut self, ids: &[AnchorId]) -> Result<CommitStats> {
        let doomed = self.local.marked().clone();
        self.write_batch(ids, &doomed)
    }

    fn write_batch(&mut self, ids: &[AnchorId], doomed: &HashSet<AnchorId>) -> Result<CommitStats> {
        let mut stats = CommitStats::default();
        let mut pending = Vec::new();

        for id in ids {
            let Some(anchor) = self.local.get(id) else {
                continue;
            };
            if !anchor.persistent {
                continue;
            }
            if !self.endpoints_present(anchor, doomed)? {
                warn!(anchor = %id, "edge endpoint missing, not writing edge");
                stats.skipped += 1;
                continue;
            }
            let outgoing = without_doomed_edges(anchor, doomed);
            match outgoing.to_record() {
                Ok(record) if anchor.hash.as_deref() == Some(record.digest().as_str()) => {
                    debug!(anchor = %id, "unchanged since last write");
                    stats.unchanged += 1;
                }
                Ok(_) => pending.push(outgoing),
                Err(e) => {
                    warn!(anchor = %id, error = %e, "skipping anchor that failed to serialize");
                    stats.skipped += 1;
                }
            }
        }

        if pending.is_empty() {
            return Ok(stats);
        }

        let backend = self.backend();
        let written = match &backend {
            Backend::Shelf(shelf) => shelf.atomically(|s| self.write_merged(&Backend::Shelf(s), pending))?,
            Backend::Remote(_) => self.write_merged(&backend, pending)?,
        };
        debug!(tier = backend.name(), count = written.len(), "committed batch");

        stats.written = written.len();
        for anchor in written {
            self.local.insert(anchor);
        }
        Ok(stats)
    }

    /// Fetch stored copies once, merge, and write the merged anchors.
    fn write_merged(&self, backend: &Backend<'_>, pending: Vec<Anchor>) -> Result<Vec<Anchor>> {
        let ids: Vec<AnchorId> = pending.iter().map(|a| a.id).collect();
        let stored = backend.load_many(&ids)?;

        let mut records = Vec::with_capacity(pending.len());
        let mut merged_anchors = Vec::with_capacity(pending.len());
        for incoming in pending {
            let mut merged = match stored.get(&incoming.id.to_string()) {
                Some(record) => match Anchor::from_record(record) {
                    Ok(current) => self.merge(current, incoming),
                    Err(e) => {
                        warn!(anchor = %incoming.id, error = %e, "stored copy unreadable, replacing it");
                        incoming
                    }
                },
                None => incoming,
            };
            match merged.to_record() {
                Ok(record) => {
                    merged.hash = Some(record.digest());
                    records.push(record);
                    merged_anchors.push(merged);
                }
                Err(e) => {
                    warn!(anchor = %merged.id, error = %e, "skipping anchor that failed to serialize");
                }
            }
        }

        backend.store_many(&records)?;
        Ok(merged_anchors)
    }

    /// Permission-gated field merge of an incoming anchor onto its stored copy.
    ///
    /// Adjacency follows `may_connect`; payload and access list follow
    /// `may_write`. Both are checked against the stored copy.
    pub fn merge(&self, stored: Anchor, incoming: Anchor) -> Anchor {
        let may_connect = self.oracle.may_connect(&self.actor, &stored);
        let may_write = self.oracle.may_write(&self.actor, &stored);
        let mut merged = stored;

        if merged.kind != incoming.kind {
            if may_connect {
                merged.kind = incoming.kind;
            } else {
                debug!(anchor = %merged.id, actor = %self.actor, "adjacency change rejected");
            }
        }

        if merged.archetype != incoming.archetype || merged.access != incoming.access {
            if may_write {
                merged.archetype = incoming.archetype;
                merged.access = incoming.access;
            } else {
                debug!(anchor = %merged.id, actor = %self.actor, "payload change rejected");
            }
        }

        merged.persistent = incoming.persistent;
        merged
    }

    /// An edge may only be written while both of its endpoints exist.
    fn endpoints_present(&self, anchor: &Anchor, doomed: &HashSet<AnchorId>) -> Result<bool> {
        let Some((source, target, _)) = anchor.endpoints() else {
            return Ok(true);
        };
        for node in [source, target] {
            if doomed.contains(&node) || self.local.is_marked(&node) {
                return Ok(false);
            }
            match self.local.get(&node) {
                Some(n) if n.persistent => continue,
                Some(_) => return Ok(false),
                None => {
                    if self.fetch(&node)?.is_none() {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

/// Copy of `anchor` whose adjacency no longer mentions edges being deleted.
fn without_doomed_edges(anchor: &Anchor, doomed: &HashSet<AnchorId>) -> Anchor {
    let mut outgoing = anchor.clone();
    if let AnchorKind::Node { edges } = &mut outgoing.kind {
        edges.retain(|e| !doomed.contains(e));
    }
    outgoing
}

#[cfg(all(feature = "redis", feature = "mongo"))]
fn open_remote(config: &MemoryConfig) -> Option<RemoteTiers> {
    use crate::memory::remote::{MongoDocuments, RedisCache};

    let cache = RedisCache::open(&config.redis_url)
        .map_err(|e| warn!(error = %e, "cannot create cache client"))
        .ok()?;
    let documents = MongoDocuments::open(
        &config.database_url,
        &config.database_name,
        &config.collection,
        config.probe_timeout(),
    )
    .map_err(|e| warn!(error = %e, "cannot create document store client"))
    .ok()?;
    Some(RemoteTiers::new(Arc::new(cache), Arc::new(documents)))
}

#[cfg(not(all(feature = "redis", feature = "mongo")))]
fn open_remote(_config: &MemoryConfig) -> Option<RemoteTiers> {
    None
}
