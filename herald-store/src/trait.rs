use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::RecordId;

/// A value that can live in a collection
pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &RecordId;
}

/// A guarded in-place change to one record.
///
/// The closure receives the current stored value and returns `true` if it
/// changed it and the change should be persisted. Returning `false` leaves
/// the stored record exactly as it was, whatever the closure did to its copy.
pub type Mutation<'a, T> = Box<dyn FnOnce(&mut T) -> bool + Send + 'a>;

/// Predicate used by [`BackingStore::scan`]
pub type Filter<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// Result of [`BackingStore::modify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modify<T> {
    /// The mutation was accepted and persisted; holds the new value
    Applied(T),
    /// The mutation declined; holds the untouched stored value
    Unchanged(T),
}

impl<T> Modify<T> {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Applied(record) | Self::Unchanged(record) => record,
        }
    }
}

/// Storage for one collection of records
///
/// Every backend applies [`BackingStore::modify`] atomically with respect to
/// other calls on the same record, which is what lets status guards run
/// without any locking on the caller's side.
#[async_trait]
pub trait BackingStore<T: Record>: Send + Sync + Debug {
    /// Store a new record
    ///
    /// # Errors
    /// Fails with [`crate::StoreError::AlreadyExists`] if the id is taken, or
    /// if the record cannot be persisted.
    async fn insert(&self, record: &T) -> crate::Result<()>;

    /// Store a batch of new records
    ///
    /// # Errors
    /// Fails if any record cannot be persisted.
    async fn insert_many(&self, records: &[T]) -> crate::Result<()> {
        for record in records {
            self.insert(record).await?;
        }
        Ok(())
    }

    /// Read one record
    ///
    /// # Errors
    /// Fails with [`crate::StoreError::NotFound`] if no such record exists.
    async fn read(&self, id: &RecordId) -> crate::Result<T>;

    /// Apply a guarded mutation to one record
    ///
    /// # Errors
    /// Fails with [`crate::StoreError::NotFound`] if no such record exists.
    async fn modify(&self, id: &RecordId, mutation: Mutation<'_, T>) -> crate::Result<Modify<T>>;

    /// Return records matching `filter`, oldest first, at most `limit` of them
    ///
    /// # Errors
    /// Fails if the collection cannot be read.
    async fn scan(&self, filter: Filter<'_, T>, limit: Option<usize>) -> crate::Result<Vec<T>>;

    /// Remove a record. Administrative only; the engine never deletes.
    ///
    /// # Errors
    /// Fails with [`crate::StoreError::NotFound`] if no such record exists.
    async fn delete(&self, id: &RecordId) -> crate::Result<()>;

    /// Number of stored records
    ///
    /// # Errors
    /// Fails if the collection cannot be read.
    async fn count(&self) -> crate::Result<usize>;
}
