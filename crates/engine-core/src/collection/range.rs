use crate::{
    collection::{Collection, CollectionLock},
    error::CollectionError,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Keeps a collection's stored range from being purged while results derived
/// from it are still in flight.
///
/// The pin is taken at [`RangePreserver::acquire`] and given back by
/// [`RangePreserver::release`], which needs the collection lock.
#[derive(Debug)]
pub struct RangePreserver {
    collection: Arc<Collection>,
    token: Uuid,
    pinned: bool,
}

impl RangePreserver {
    pub fn acquire(collection: &Arc<Collection>) -> Result<Self, CollectionError> {
        let mut lock = collection.lock();
        if lock.is_dropped() {
            return Err(CollectionError::Dropped(collection.name().to_string()));
        }
        lock.pin_range();

        let token = Uuid::new_v4();
        debug!(collection = %collection.name(), %token, "Range pinned");

        Ok(Self {
            collection: collection.clone(),
            token,
            pinned: true,
        })
    }

    /// Unpins the range. No-op if already released.
    ///
    /// `lock` must belong to the pinned collection.
    pub fn release(&mut self, lock: &mut CollectionLock<'_>) {
        if !self.pinned {
            return;
        }
        debug_assert_eq!(lock.collection_name(), self.collection.name());

        lock.unpin_range();
        self.pinned = false;
        debug!(collection = %self.collection.name(), token = %self.token, "Range released");
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }
}

impl Drop for RangePreserver {
    fn drop(&mut self) {
        if !self.pinned {
            return;
        }
        // Released without the caller's lock scope; fall back to taking it here.
        match self.collection.try_lock() {
            Some(mut lock) => {
                warn!(collection = %self.collection.name(), token = %self.token, "Range pin dropped without release");
                lock.unpin_range();
                self.pinned = false;
            }
            None => {
                warn!(collection = %self.collection.name(), token = %self.token, "Range pin leaked: collection lock busy");
            }
        }
    }
}
