//! In-memory index store.
//!
//! Every index lives behind its own `tokio::sync::Mutex`, so writers to
//! different indexes never wait on each other while writers to the same
//! index are serialized. The catalog (slugs, creation order) sits behind a
//! separate lock that is never held across an index lease acquisition.

use async_trait::async_trait;
use docindex_core::{IndexId, IndexLease, IndexState, IndexStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Default)]
struct Catalog {
    indexes: HashMap<IndexId, Arc<Mutex<IndexState>>>,
    slugs: HashMap<String, IndexId>,
    /// Creation order
    order: Vec<IndexId>,
}

/// Index store that keeps every index in memory.
///
/// Nothing survives the process. A commit swaps the lease's working copy
/// in; a lease dropped without one changes nothing.
#[derive(Default)]
pub struct MemoryIndexStore {
    catalog: RwLock<Catalog>,
}

impl MemoryIndexStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored indexes.
    pub async fn len(&self) -> usize {
        self.catalog.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn insert_index(&self, state: IndexState) -> Result<IndexId, StoreError> {
        let id = state.id();
        let slug = state.index.slug.clone();

        let mut catalog = self.catalog.write().await;
        if catalog.slugs.contains_key(&slug) {
            return Err(StoreError::Duplicate(format!("slug {slug}")));
        }
        if catalog.indexes.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("index {id}")));
        }

        catalog.slugs.insert(slug.clone(), id);
        catalog.order.push(id);
        catalog.indexes.insert(id, Arc::new(Mutex::new(state)));
        debug!("Stored index {} ({})", id, slug);
        Ok(id)
    }

    async fn remove_index(&self, id: IndexId) -> Result<bool, StoreError> {
        let mut catalog = self.catalog.write().await;
        if catalog.indexes.remove(&id).is_none() {
            return Ok(false);
        }
        catalog.slugs.retain(|_, owner| *owner != id);
        catalog.order.retain(|existing| *existing != id);
        debug!("Removed index {}", id);
        Ok(true)
    }

    async fn index_ids(&self) -> Result<Vec<IndexId>, StoreError> {
        Ok(self.catalog.read().await.order.clone())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<IndexId>, StoreError> {
        Ok(self.catalog.read().await.slugs.get(slug).copied())
    }

    async fn rename_slug(&self, id: IndexId, slug: &str) -> Result<(), StoreError> {
        let mut catalog = self.catalog.write().await;
        if !catalog.indexes.contains_key(&id) {
            return Err(StoreError::Unavailable(format!("index {id} is not stored")));
        }
        match catalog.slugs.get(slug) {
            Some(owner) if *owner == id => return Ok(()),
            Some(_) => return Err(StoreError::Duplicate(format!("slug {slug}"))),
            None => {}
        }
        catalog.slugs.retain(|_, owner| *owner != id);
        catalog.slugs.insert(slug.to_string(), id);
        Ok(())
    }

    async fn lease(&self, id: IndexId) -> Result<Option<IndexLease>, StoreError> {
        let Some(slot) = self.catalog.read().await.indexes.get(&id).cloned() else {
            return Ok(None);
        };

        let guard = Arc::clone(&slot).lock_owned().await;

        // The index may have been deleted while we waited.
        let still_stored = self
            .catalog
            .read()
            .await
            .indexes
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot));
        if !still_stored {
            debug!("Index {} was removed while waiting for its lease", id);
            return Ok(None);
        }
        Ok(Some(IndexLease::new(guard)))
    }

    async fn commit(&self, lease: IndexLease) -> Result<(), StoreError> {
        let id = lease.id();
        if lease.write_back() {
            debug!("Committed index {}", id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docindex_core::NewIndex;
    use std::time::Duration;

    fn state(slug: &str) -> IndexState {
        IndexState::new(NewIndex::new(slug.to_uppercase(), slug))
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryIndexStore::new();
        assert!(store.is_empty().await);

        let tags = store.insert_index(state("tags")).await.unwrap();
        let types = store.insert_index(state("types")).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.index_ids().await.unwrap(), vec![tags, types]);
        assert_eq!(store.find_by_slug("types").await.unwrap(), Some(types));
        assert_eq!(store.find_by_slug("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let store = MemoryIndexStore::new();
        store.insert_index(state("tags")).await.unwrap();

        let err = store.insert_index(state("tags")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_index() {
        let store = MemoryIndexStore::new();
        let id = store.insert_index(state("tags")).await.unwrap();

        assert!(store.remove_index(id).await.unwrap());
        assert!(!store.remove_index(id).await.unwrap());
        assert!(store.lease(id).await.unwrap().is_none());
        assert_eq!(store.find_by_slug("tags").await.unwrap(), None);

        // The slug is free again
        store.insert_index(state("tags")).await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_slug() {
        let store = MemoryIndexStore::new();
        let tags = store.insert_index(state("tags")).await.unwrap();
        store.insert_index(state("types")).await.unwrap();

        store.rename_slug(tags, "labels").await.unwrap();
        assert_eq!(store.find_by_slug("labels").await.unwrap(), Some(tags));
        assert_eq!(store.find_by_slug("tags").await.unwrap(), None);

        // Renaming to its own slug is a no-op
        store.rename_slug(tags, "labels").await.unwrap();

        let err = store.rename_slug(tags, "types").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_lease_persists_changes() {
        let store = MemoryIndexStore::new();
        let id = store.insert_index(state("tags")).await.unwrap();

        let mut lease = store.lease(id).await.unwrap().unwrap();
        lease.index.label = "Renamed".to_string();
        store.commit(lease).await.unwrap();

        let lease = store.lease(id).await.unwrap().unwrap();
        assert_eq!(lease.index.label, "Renamed");
    }

    #[tokio::test]
    async fn test_uncommitted_lease_is_rolled_back() {
        let store = MemoryIndexStore::new();
        let id = store.insert_index(state("tags")).await.unwrap();

        let mut lease = store.lease(id).await.unwrap().unwrap();
        lease.index.label = "uncommitted".to_string();
        lease.instances.clear();
        drop(lease);

        let lease = store.lease(id).await.unwrap().unwrap();
        assert_eq!(lease.index.label, "TAGS");
        assert!(!lease.is_modified());
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let store = Arc::new(MemoryIndexStore::new());
        let id = store.insert_index(state("tags")).await.unwrap();

        let held = store.lease(id).await.unwrap().unwrap();

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.lease(id).await.unwrap().is_some() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        store.commit(held).await.unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_leases_on_different_indexes_are_independent() {
        let store = MemoryIndexStore::new();
        let a = store.insert_index(state("a")).await.unwrap();
        let b = store.insert_index(state("b")).await.unwrap();

        let lease_a = store.lease(a).await.unwrap().unwrap();
        let lease_b = tokio::time::timeout(Duration::from_secs(1), store.lease(b))
            .await
            .expect("lease on another index must not wait")
            .unwrap();
        assert!(lease_b.is_some());
        drop(lease_a);
    }

    #[tokio::test]
    async fn test_lease_after_removal_while_waiting() {
        let store = Arc::new(MemoryIndexStore::new());
        let id = store.insert_index(state("tags")).await.unwrap();

        let held = store.lease(id).await.unwrap().unwrap();
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.lease(id).await.unwrap().is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.remove_index(id).await.unwrap());
        drop(held);
        assert!(!waiter.await.unwrap());
    }
}
