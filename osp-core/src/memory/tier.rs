//! Remote tier interfaces and in-process implementations.
//!
//! The fast cache and the document store are shared between every execution
//! context of a deployment. Their clients are expected to be internally
//! thread-safe (connection pools), so the traits take `&self`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::anchor::{AnchorId, StoredRecord};
use crate::error::{Error, Result};

/// Fast remote key-value cache keyed by `anchor:<id>`.
pub trait CacheTier: Send + Sync {
    /// Liveness probe bounded by `timeout`.
    fn ping(&self, timeout: Duration) -> bool;

    fn get(&self, id: &AnchorId) -> Result<Option<StoredRecord>>;

    fn set(&self, record: &StoredRecord) -> Result<()>;

    fn set_many(&self, records: &[StoredRecord]) -> Result<()> {
        for record in records {
            self.set(record)?;
        }
        Ok(())
    }

    fn delete(&self, id: &AnchorId) -> Result<()>;
}

/// Document store keyed by the anchor id string.
pub trait DocumentTier: Send + Sync {
    /// Liveness probe bounded by `timeout`.
    fn ping(&self, timeout: Duration) -> bool;

    fn find_one(&self, id: &AnchorId) -> Result<Option<StoredRecord>>;

    /// Fetch every stored record among `ids` in one round trip.
    fn find_many(&self, ids: &[AnchorId]) -> Result<Vec<StoredRecord>>;

    /// Insert or replace `records` in one multi-document write.
    fn upsert_many(&self, records: &[StoredRecord]) -> Result<()>;

    fn delete_many(&self, ids: &[AnchorId]) -> Result<()>;
}

/// Both remote tiers, always used together.
#[derive(Clone)]
pub struct RemoteTiers {
    pub cache: Arc<dyn CacheTier>,
    pub documents: Arc<dyn DocumentTier>,
}

impl RemoteTiers {
    pub fn new(
        cache: Arc<dyn CacheTier>,
        documents: Arc<dyn DocumentTier>,
    ) -> Self {
        Self { cache, documents }
    }

    /// The fast cache gates the pair: a dead cache means the pair is unusable.
    pub fn ping(&self, timeout: Duration) -> bool {
        self.cache.ping(timeout)
    }
}

fn offline(tier: &'static str) -> Error {
    Error::storage(tier, "tier is offline")
}

/// In-process cache tier with switchable liveness.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the tier fail its probe and every operation.
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Number of records written so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, id: &AnchorId) -> bool {
        self.entries.lock().contains_key(&id.storage_key())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, as a cache eviction or restart would.
    pub fn flush(&self) {
        self.entries.lock().clear();
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(offline("cache"))
        } else {
            Ok(())
        }
    }
}

impl CacheTier for InMemoryCache {
    fn ping(&self, _timeout: Duration) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    fn get(&self, id: &AnchorId) -> Result<Option<StoredRecord>> {
        self.check()?;
        self.entries
            .lock()
            .get(&id.storage_key())
            .map(|raw| StoredRecord::from_json(raw))
            .transpose()
    }

    fn set(&self, record: &StoredRecord) -> Result<()> {
        self.check()?;
        self.entries.lock().insert(record.key(), record.to_json()?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, id: &AnchorId) -> Result<()> {
        self.check()?;
        self.entries.lock().remove(&id.storage_key());
        Ok(())
    }
}

/// In-process document tier with switchable liveness.
#[derive(Default)]
pub struct InMemoryDocuments {
    docs: Mutex<HashMap<String, StoredRecord>>,
    offline: AtomicBool,
    round_trips: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Number of documents written so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of write requests issued so far.
    pub fn write_round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &AnchorId) -> Option<StoredRecord> {
        self.docs.lock().get(&id.to_string()).cloned()
    }

    /// Store a record directly, as another process would.
    pub fn insert(&self, record: StoredRecord) {
        self.docs.lock().insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(offline("documents"))
        } else {
            Ok(())
        }
    }
}

impl DocumentTier for InMemoryDocuments {
    fn ping(&self, _timeout: Duration) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    fn find_one(&self, id: &AnchorId) -> Result<Option<StoredRecord>> {
        self.check()?;
        Ok(self.get(id))
    }

    fn find_many(&self, ids: &[AnchorId]) -> Result<Vec<StoredRecord>> {
        self.check()?;
        let docs = self.docs.lock();
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(&id.to_string()).cloned())
            .collect())
    }

    fn upsert_many(&self, records: &[StoredRecord]) -> Result<()> {
        self.check()?;
        if records.is_empty() {
            return Ok(());
        }
        let mut docs = self.docs.lock();
        for record in records {
            docs.insert(record.id.clone(), record.clone());
        }
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        self.writes.fetch_add(records.len(), Ordering::SeqCst);
        Ok(())
    }

    fn delete_many(&self, ids: &[AnchorId]) -> Result<()> {
        self.check()?;
        let mut docs = self.docs.lock();
        for id in ids {
            docs.remove(&id.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{Anchor, Payload};

    fn record() -> (AnchorId, StoredRecord) {
        let anchor = Anchor::node(Payload::new("A"), AnchorId::new());
        (anchor.id, anchor.to_record().unwrap())
    }

    #[test]
    fn test_cache_round_trip_and_offline() {
        let cache = InMemoryCache::new();
        let (id, rec) = record();

        cache.set(&rec).unwrap();
        assert_eq!(cache.get(&id).unwrap(), Some(rec));
        assert_eq!(cache.writes(), 1);

        cache.set_online(false);
        assert!(!cache.ping(Duration::from_millis(1)));
        assert!(cache.get(&id).is_err());

        cache.set_online(true);
        cache.delete(&id).unwrap();
        assert_eq!(cache.get(&id).unwrap(), None);
    }

    #[test]
    fn test_documents_bulk_write_is_one_round_trip() {
        let docs = InMemoryDocuments::new();
        let (a, ra) = record();
        let (b, rb) = record();

        docs.upsert_many(&[ra, rb]).unwrap();
        assert_eq!(docs.write_round_trips(), 1);
        assert_eq!(docs.writes(), 2);
        assert_eq!(docs.find_many(&[a, b, AnchorId::new()]).unwrap().len(), 2);

        docs.delete_many(&[a]).unwrap();
        assert!(docs.find_one(&a).unwrap().is_none());
        assert!(docs.find_one(&b).unwrap().is_some());
    }
}
