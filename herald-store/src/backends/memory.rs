use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    StoreError,
    r#trait::{BackingStore, Filter, Modify, Mutation, Record},
    types::RecordId,
};

/// In-memory backing store implementation
///
/// Records live in a `DashMap`, so `modify` holds the shard lock of exactly
/// one record while the mutation runs. Intended for tests and development.
///
/// # Capacity Management
/// The store can be configured with a maximum capacity to prevent unbounded
/// memory growth. When capacity is reached, inserts fail with
/// [`StoreError::CapacityExceeded`].
#[derive(Debug, Clone)]
pub struct MemoryBackingStore<T: Record> {
    pub(crate) records: Arc<DashMap<RecordId, T>>,
    /// Maximum number of records to store (None = unlimited)
    capacity: Option<usize>,
}

impl<T: Record> MemoryBackingStore<T> {
    /// Create a new empty memory-backed store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            capacity: None,
        }
    }

    /// Create a new memory-backed store with a capacity limit
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            capacity: Some(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn ensure_room_for(&self, additional: usize) -> crate::Result<()> {
        if let Some(capacity) = self.capacity
            && self.len() + additional > capacity
        {
            return Err(StoreError::CapacityExceeded {
                len: self.len(),
                capacity,
            });
        }
        Ok(())
    }
}

impl<T: Record> Default for MemoryBackingStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> BackingStore<T> for MemoryBackingStore<T> {
    async fn insert(&self, record: &T) -> crate::Result<()> {
        self.ensure_room_for(1)?;

        match self.records.entry(*record.id()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(*record.id())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn insert_many(&self, records: &[T]) -> crate::Result<()> {
        self.ensure_room_for(records.len())?;

        if let Some(existing) = records
            .iter()
            .find(|record| self.records.contains_key(record.id()))
        {
            return Err(StoreError::AlreadyExists(*existing.id()));
        }

        for record in records {
            self.records.insert(*record.id(), record.clone());
        }

        Ok(())
    }

    async fn read(&self, id: &RecordId) -> crate::Result<T> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*id))
    }

    async fn modify(&self, id: &RecordId, mutation: Mutation<'_, T>) -> crate::Result<Modify<T>> {
        let Some(mut entry) = self.records.get_mut(id) else {
            return Err(StoreError::NotFound(*id));
        };

        let mut candidate = entry.value().clone();
        if mutation(&mut candidate) {
            *entry.value_mut() = candidate.clone();
            Ok(Modify::Applied(candidate))
        } else {
            Ok(Modify::Unchanged(entry.value().clone()))
        }
    }

    async fn scan(&self, filter: Filter<'_, T>, limit: Option<usize>) -> crate::Result<Vec<T>> {
        let mut ids: Vec<RecordId> = self
            .records
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        // ULIDs are lexicographically sortable by creation time
        ids.sort_unstable();
        if let Some(limit) = limit {
            ids.truncate(limit);
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|entry| entry.value().clone()))
            .filter(|record| filter(record))
            .collect())
    }

    async fn delete(&self, id: &RecordId) -> crate::Result<()> {
        self.records
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(*id))
    }

    async fn count(&self) -> crate::Result<usize> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Counter {
        id: RecordId,
        value: u32,
    }

    impl Record for Counter {
        fn id(&self) -> &RecordId {
            &self.id
        }
    }

    fn counter(value: u32) -> Counter {
        Counter {
            id: RecordId::generate(),
            value,
        }
    }

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryBackingStore::new();
        let record = counter(1);

        store.insert(&record).await.expect("Failed to insert");
        assert_eq!(store.count().await.expect("Failed to count"), 1);
        assert_eq!(store.read(&record.id).await.expect("Failed to read"), record);

        store.delete(&record.id).await.expect("Failed to delete");
        assert!(store.is_empty());
        assert!(matches!(
            store.read(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_ids() {
        let store = MemoryBackingStore::new();
        let record = counter(1);

        store.insert(&record).await.expect("Failed to insert");
        assert!(matches!(
            store.insert(&record).await,
            Err(StoreError::AlreadyExists(id)) if id == record.id
        ));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let store = MemoryBackingStore::with_capacity(2);
        store.insert(&counter(1)).await.expect("first insert");
        store.insert(&counter(2)).await.expect("second insert");

        assert!(matches!(
            store.insert(&counter(3)).await,
            Err(StoreError::CapacityExceeded {
                len: 2,
                capacity: 2
            })
        ));
        assert!(store.insert_many(&[counter(4)]).await.is_err());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_modify_declined_leaves_record_untouched() {
        let store = MemoryBackingStore::new();
        let record = counter(1);
        store.insert(&record).await.expect("Failed to insert");

        let outcome = store
            .modify(
                &record.id,
                Box::new(|c: &mut Counter| {
                    c.value = 99;
                    false
                }),
            )
            .await
            .expect("Failed to modify");

        assert_eq!(outcome, Modify::Unchanged(record.clone()));
        assert_eq!(store.read(&record.id).await.expect("read").value, 1);

        let outcome = store
            .modify(
                &record.id,
                Box::new(|c: &mut Counter| {
                    c.value += 1;
                    true
                }),
            )
            .await
            .expect("Failed to modify");
        assert!(outcome.is_applied());
        assert_eq!(outcome.into_inner().value, 2);
    }

    #[tokio::test]
    async fn test_scan_is_ordered_filtered_and_limited() {
        let store = MemoryBackingStore::new();
        let mut inserted = Vec::new();
        for value in 0..10 {
            let record = counter(value);
            store.insert(&record).await.expect("Failed to insert");
            inserted.push(record);
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let even = store
            .scan(&|c: &Counter| c.value % 2 == 0, Some(3))
            .await
            .expect("Failed to scan");

        assert_eq!(
            even.iter().map(|c| c.value).collect::<Vec<_>>(),
            vec![0, 2, 4]
        );

        let all = store.scan(&|_| true, None).await.expect("Failed to scan");
        assert_eq!(all, inserted);
    }
}
