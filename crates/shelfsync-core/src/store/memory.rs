// # Memory Local Store
//
// In-memory implementation of LocalStore.
//
// Nothing survives a restart. Used by tests and by hosts that keep their
// library elsewhere and only want the reconciliation results.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{BookId, LocalRecord};
use crate::traits::{LocalStore, WriteOptions};

/// In-memory local store
///
/// Records live in a map keyed by [`BookId`] behind a RwLock, so store order
/// is ascending id. Cloning shares the underlying map.
///
/// # Example
///
/// ```rust,no_run
/// use shelfsync_core::model::{BookId, LocalRecord};
/// use shelfsync_core::store::MemoryLocalStore;
/// use shelfsync_core::traits::LocalStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryLocalStore::new();
///     store.insert(LocalRecord::new(BookId(1), "uuid-1", "Dune")).await;
///
///     let record = store.read(BookId(1)).await?;
///     assert_eq!(record.title, "Dune");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    inner: Arc<RwLock<BTreeMap<BookId, LocalRecord>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryLocalStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with records
    pub fn with_records(records: impl IntoIterator<Item = LocalRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.book_id, r)).collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Insert or replace a record wholesale
    pub async fn insert(&self, record: LocalRecord) {
        self.inner.write().await.insert(record.book_id, record);
    }

    /// Remove a record, as if the book were deleted from the library
    pub async fn remove(&self, id: BookId) -> Option<LocalRecord> {
        self.inner.write().await.remove(&id)
    }

    /// Number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Number of successful `write` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn list_books(&self) -> Result<Vec<BookId>, Error> {
        Ok(self.inner.read().await.keys().copied().collect())
    }

    async fn resolve(&self, uuid: &str) -> Result<Option<BookId>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .values()
            .find(|r| r.uuid == uuid)
            .map(|r| r.book_id))
    }

    async fn read(&self, id: BookId) -> Result<LocalRecord, Error> {
        let guard = self.inner.read().await;
        guard
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::record_not_found(id.to_string()))
    }

    async fn write(
        &self,
        id: BookId,
        record: &LocalRecord,
        options: WriteOptions,
    ) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let stored = guard
            .get_mut(&id)
            .ok_or_else(|| Error::record_not_found(record.uuid.clone()))?;
        super::merge_record(stored, record, options);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
