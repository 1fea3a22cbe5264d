//! Test doubles and fixtures shared by the contract tests

#![allow(dead_code)]

use serde_json::{Value, json};
use shelfsync_core::config::{ColumnSelection, ConnectionConfig, SyncConfig};
use shelfsync_core::error::{Error, Result};
use shelfsync_core::mapping::{FieldKey, FieldMappingTable};
use shelfsync_core::model::{BookId, LocalRecord, REMOTE_ID_KEY};
use shelfsync_core::store::MemoryLocalStore;
use shelfsync_core::traits::{LocalStore, RemoteCatalog, WriteOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A RemoteCatalog serving fixed payloads, with call counters
///
/// Clones share counters and switches, so a test can keep one handle while
/// the runner owns another.
#[derive(Clone)]
pub struct CannedCatalog {
    items: Value,
    profile: Value,
    delay: Option<Duration>,
    failing: Arc<AtomicBool>,
    items_calls: Arc<AtomicUsize>,
    profile_calls: Arc<AtomicUsize>,
}

impl CannedCatalog {
    pub fn new(items: Value, profile: Value) -> Self {
        Self {
            items,
            profile,
            delay: None,
            failing: Arc::new(AtomicBool::new(false)),
            items_calls: Arc::new(AtomicUsize::new(0)),
            profile_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep before answering every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the profile call fail from now on
    pub fn fail_profile(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn items_calls(&self) -> usize {
        self.items_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl RemoteCatalog for CannedCatalog {
    async fn list_library_items(&self) -> Result<Value> {
        self.items_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.items.clone())
    }

    async fn get_profile(&self) -> Result<Value> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::fetch("API request failed with status 500"));
        }
        Ok(self.profile.clone())
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

/// Three library items: two share an ISBN, one carries an ASIN
pub fn library_payload() -> Value {
    json!({
        "results": [
            {
                "id": "li_dune",
                "size": 524_288_000u64,
                "numFiles": 3,
                "media": {
                    "duration": 75600.0,
                    "numChapters": 48,
                    "metadata": {
                        "title": "Dune",
                        "authorName": "Frank Herbert",
                        "narratorName": "Scott Brick",
                        "isbn": "9780441013593",
                        "abridged": false
                    }
                }
            },
            {
                "id": "li_emma_1",
                "media": {"metadata": {"title": "Emma", "authorName": "Jane Austen", "isbn": "111"}}
            },
            {
                "id": "li_emma_2",
                "media": {"metadata": {"title": "Emma", "authorName": "Jane Austen", "isbn": "111", "asin": "B00EMMA"}}
            }
        ],
        "total": 3
    })
}

/// Profile with progress on Dune and one bookmark
pub fn profile_payload() -> Value {
    json!({
        "id": "usr_1",
        "mediaProgress": [
            {
                "libraryItemId": "li_dune",
                "progress": 0.125,
                "currentTime": 32130.0,
                "isFinished": false,
                "lastUpdate": 1_700_000_000_000i64,
                "startedAt": 1_690_000_000_000i64,
                "finishedAt": null
            }
        ],
        "bookmarks": [{"title": "Spice", "time": 4100}]
    })
}

/// An unlinked local book
pub fn book(id: u64, title: &str) -> LocalRecord {
    LocalRecord::new(BookId(id), format!("uuid-{}", id), title)
}

/// A local book linked to a remote item
pub fn linked_book(id: u64, title: &str, remote_id: &str) -> LocalRecord {
    book(id, title).with_identifier(REMOTE_ID_KEY, remote_id)
}

/// Every field enabled, writing to its default column
pub fn all_columns() -> ColumnSelection {
    let table = FieldMappingTable::standard();
    FieldKey::ALL.iter().fold(ColumnSelection::new(), |columns, key| {
        let column = table.get(*key).map(|m| m.default_column).unwrap_or_default();
        columns.with(*key, column)
    })
}

/// A valid configuration with the given columns
pub fn config_with(columns: ColumnSelection) -> SyncConfig {
    SyncConfig::new(ConnectionConfig::new("http://abs.test", "lib_main", "test-key"))
        .with_columns(columns)
}

/// A MemoryLocalStore wrapper that fails reads or writes for chosen books
pub struct FaultyStore {
    inner: MemoryLocalStore,
    unreadable: Vec<BookId>,
    unwritable: Vec<BookId>,
}

impl FaultyStore {
    pub fn new(inner: MemoryLocalStore) -> Self {
        Self {
            inner,
            unreadable: Vec::new(),
            unwritable: Vec::new(),
        }
    }

    pub fn failing_read(mut self, id: BookId) -> Self {
        self.unreadable.push(id);
        self
    }

    pub fn failing_write(mut self, id: BookId) -> Self {
        self.unwritable.push(id);
        self
    }
}

#[async_trait::async_trait]
impl LocalStore for FaultyStore {
    async fn list_books(&self) -> Result<Vec<BookId>> {
        self.inner.list_books().await
    }

    async fn resolve(&self, uuid: &str) -> Result<Option<BookId>> {
        self.inner.resolve(uuid).await
    }

    async fn read(&self, id: BookId) -> Result<LocalRecord> {
        if self.unreadable.contains(&id) {
            return Err(Error::local_store(format!("Book {} is locked", id)));
        }
        self.inner.read(id).await
    }

    async fn write(&self, id: BookId, record: &LocalRecord, options: WriteOptions) -> Result<()> {
        if self.unwritable.contains(&id) {
            return Err(Error::local_store("Disk is read-only"));
        }
        self.inner.write(id, record, options).await
    }
}
