//! Lazily populated collection name → handle cache.
//!
//! # Responsibility
//! - Create physical collections on first save into an unseen name.
//! - Serve repeated lookups without touching storage.
//!
//! # Invariants
//! - At most one caller runs the creation path for a given name; others
//!   wait on that name's slot only, never on other names.
//! - Read-side lookups never create collections or cache misses.
//! - A failed creation leaves the slot empty so the next call retries.

use crate::model::collection::CollectionHandle;
use crate::repo::document_store::{DocumentStore, RepoResult};
use log::{debug, info};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type Slot = Arc<OnceCell<CollectionHandle>>;

/// Process-lifetime registry owned by one store instance.
#[derive(Default)]
pub struct CollectionRegistry {
    slots: RwLock<HashMap<String, Slot>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `name`, creating the collection if needed.
    pub fn resolve<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        name: &str,
    ) -> RepoResult<CollectionHandle> {
        let slot = self.slot(name);
        if let Some(handle) = slot.get() {
            return Ok(handle.clone());
        }

        slot.get_or_try_init(|| -> RepoResult<CollectionHandle> {
            let handle = store.ensure_collection(name)?;
            info!(
                "event=collection_resolve module=registry status=ok collection={} id={}",
                name,
                handle.id()
            );
            Ok(handle)
        })
        .cloned()
    }

    /// Returns the handle for an existing collection without creating it.
    pub fn lookup<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        name: &str,
    ) -> RepoResult<Option<CollectionHandle>> {
        if let Some(handle) = self.cached(name) {
            return Ok(Some(handle));
        }

        let Some(found) = store.find_collection(name)? else {
            debug!("event=collection_lookup module=registry status=miss");
            return Ok(None);
        };
        let slot = self.slot(name);
        Ok(Some(slot.get_or_init(|| found).clone()))
    }

    /// Number of names with a resolved handle.
    pub fn cached_len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    fn cached(&self, name: &str) -> Option<CollectionHandle> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|slot| slot.get().cloned())
    }

    fn slot(&self, name: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(name.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::CollectionRegistry;
    use crate::db::PoolOptions;
    use crate::repo::document_store::DocumentStore;
    use crate::repo::sqlite_store::SqliteDocumentStore;

    #[test]
    fn lookup_does_not_create_or_cache_unknown_names() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let registry = CollectionRegistry::new();

        assert!(registry.lookup(&store, "ghost").unwrap().is_none());
        assert_eq!(registry.cached_len(), 0);
        assert!(store.list_collections().unwrap().is_empty());
    }

    #[test]
    fn resolve_creates_once_and_caches() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let registry = CollectionRegistry::new();

        let created = registry.resolve(&store, "foo").unwrap();
        let cached = registry.resolve(&store, "foo").unwrap();
        let looked_up = registry.lookup(&store, "foo").unwrap().unwrap();

        assert_eq!(created, cached);
        assert_eq!(created, looked_up);
        assert_eq!(registry.cached_len(), 1);
        assert_eq!(store.list_collections().unwrap().len(), 1);
    }

    #[test]
    fn lookup_caches_collections_created_elsewhere() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let registry = CollectionRegistry::new();
        let created = store.ensure_collection("foo").unwrap();

        assert_eq!(registry.lookup(&store, "foo").unwrap(), Some(created));
        assert_eq!(registry.cached_len(), 1);
    }
}
