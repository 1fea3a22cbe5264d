// # Local Store Trait
//
// Defines the interface to the local book library.
//
// ## Implementations
//
// - Memory: `MemoryLocalStore` (tests, embedding)
// - File: `JsonFileLocalStore` (daemon)
//
// ## Identity
//
// A record is addressed by its numeric [`BookId`] for the lifetime of a run.
// Writes re-resolve the book through its `uuid` first so that a book deleted
// (or replaced) between read and write is reported instead of clobbered.

use async_trait::async_trait;

use crate::model::{BookId, LocalRecord};

/// Flags controlling what a write may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Leave the title untouched
    pub preserve_title: bool,
    /// Leave the author list untouched
    pub preserve_authors: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            preserve_title: true,
            preserve_authors: true,
        }
    }
}

/// Trait for local store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All book ids, in store order
    async fn list_books(&self) -> Result<Vec<BookId>, crate::Error>;

    /// Resolve a book by its uuid
    ///
    /// Returns `None` if no book currently carries the uuid.
    async fn resolve(&self, uuid: &str) -> Result<Option<BookId>, crate::Error>;

    /// Read one record
    ///
    /// Returns [`Error::RecordNotFound`](crate::Error::RecordNotFound) for
    /// an unknown id.
    async fn read(&self, id: BookId) -> Result<LocalRecord, crate::Error>;

    /// Write one record back
    ///
    /// With the default options only identifiers and custom fields are
    /// replaced.
    async fn write(
        &self,
        id: BookId,
        record: &LocalRecord,
        options: WriteOptions,
    ) -> Result<(), crate::Error>;

    /// Flush pending writes
    async fn flush(&self) -> Result<(), crate::Error> {
        Ok(())
    }
}
