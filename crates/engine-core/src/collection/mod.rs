use crate::collection::registry::CursorRegistry;
use model::records::document::RawRecord;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use tracing::{debug, info};

pub mod range;
pub mod registry;

/// Catalog state of a collection. Only reachable through a [`CollectionLock`].
#[derive(Debug, Default)]
pub struct CatalogEntry {
    dropped: bool,
    purge_pending: bool,
    range_pins: usize,
    registry: CursorRegistry,
}

/// In-memory collection: stored records plus the catalog entry that tracks
/// who is reading from it.
#[derive(Debug)]
pub struct Collection {
    name: String,
    records: RwLock<Vec<RawRecord>>,
    catalog: Mutex<CatalogEntry>,
}

/// Proof that the collection lock is held.
///
/// Teardown of executors and range pins takes `&mut CollectionLock`, so the
/// lock requirement is checked by the compiler rather than by convention.
pub struct CollectionLock<'a> {
    collection: &'a Collection,
    entry: MutexGuard<'a, CatalogEntry>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_records(name, Vec::new())
    }

    pub fn with_records(name: impl Into<String>, records: Vec<RawRecord>) -> Arc<Self> {
        Arc::new(Collection {
            name: name.into(),
            records: RwLock::new(records),
            catalog: Mutex::new(CatalogEntry::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the collection lock. A poisoned lock is recovered, since the
    /// catalog entry holds no partially-applied invariants across a panic.
    pub fn lock(&self) -> CollectionLock<'_> {
        let entry = self.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        CollectionLock {
            collection: self,
            entry,
        }
    }

    /// Non-blocking variant of [`Collection::lock`] for teardown paths.
    pub fn try_lock(&self) -> Option<CollectionLock<'_>> {
        let entry = match self.catalog.try_lock() {
            Ok(entry) => entry,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(CollectionLock {
            collection: self,
            entry,
        })
    }

    pub fn insert(&self, record: RawRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn record_at(&self, position: usize) -> Option<RawRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(position)
            .cloned()
    }

    /// Number of records still physically stored.
    pub fn stored_len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops the collection: kills all registered executors and purges the
    /// stored records, unless a range pin is outstanding, in which case the
    /// purge waits for the last pin to be released.
    pub fn drop_collection(&self) {
        let mut lock = self.lock();
        lock.entry.dropped = true;
        let killed = lock
            .entry
            .registry
            .kill_all(&format!("collection '{}' dropped", self.name));

        if lock.entry.range_pins == 0 {
            self.purge();
        } else {
            lock.entry.purge_pending = true;
        }

        info!(
            collection = %self.name,
            killed_executors = killed,
            pins = lock.entry.range_pins,
            "Collection dropped"
        );
    }

    fn purge(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!(collection = %self.name, "Purged collection records");
    }
}

impl CollectionLock<'_> {
    pub fn collection_name(&self) -> &str {
        &self.collection.name
    }

    pub fn is_dropped(&self) -> bool {
        self.entry.dropped
    }

    pub fn registry(&self) -> &CursorRegistry {
        &self.entry.registry
    }

    pub fn registry_mut(&mut self) -> &mut CursorRegistry {
        &mut self.entry.registry
    }

    pub fn range_pins(&self) -> usize {
        self.entry.range_pins
    }

    pub(crate) fn pin_range(&mut self) {
        self.entry.range_pins += 1;
    }

    pub(crate) fn unpin_range(&mut self) {
        self.entry.range_pins = self.entry.range_pins.saturating_sub(1);
        if self.entry.range_pins == 0 && self.entry.purge_pending {
            self.entry.purge_pending = false;
            self.collection.purge();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorId, YieldPolicy};
    use serde_json::json;

    fn record(n: i64) -> RawRecord {
        json!({ "n": n }).as_object().cloned().unwrap()
    }

    #[test]
    fn test_drop_kills_registered_executors() {
        let coll = Collection::with_records("c", vec![record(1)]);
        let kill = coll
            .lock()
            .registry_mut()
            .register(ExecutorId::new(), YieldPolicy::YieldAuto);

        coll.drop_collection();

        assert!(kill.is_killed());
        assert!(coll.lock().is_dropped());
        assert_eq!(coll.stored_len(), 0);
    }

    #[test]
    fn test_purge_waits_for_last_pin() {
        let coll = Collection::with_records("c", vec![record(1), record(2)]);
        coll.lock().pin_range();

        coll.drop_collection();
        assert_eq!(coll.stored_len(), 2);

        coll.lock().unpin_range();
        assert_eq!(coll.stored_len(), 0);
    }

    #[test]
    fn test_try_lock_fails_while_locked() {
        let coll = Collection::new("c");
        let _held = coll.lock();
        assert!(coll.try_lock().is_none());
    }
}
