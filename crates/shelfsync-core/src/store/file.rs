// # JSON File Local Store
//
// File-based implementation of LocalStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Corruption detection: JSON validation on load
// - Automatic backup: `.backup` holds the previous good state
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "books": [
//     {
//       "book_id": 1,
//       "uuid": "6f1c...",
//       "title": "Dune",
//       "authors": ["Frank Herbert"],
//       "identifiers": { "isbn": "9780441013593" },
//       "fields": { "#abs_progint": { "type": "int", "value": 42 } }
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{BookId, LocalRecord};
use crate::traits::{LocalStore, WriteOptions};

/// Library file format version
const LIBRARY_FILE_VERSION: &str = "1.0";

/// File-backed local store
///
/// The whole library is held in memory and rewritten atomically on every
/// successful write.
#[derive(Debug)]
pub struct JsonFileLocalStore {
    path: PathBuf,
    books: Arc<RwLock<BTreeMap<BookId, LocalRecord>>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct LibraryFileFormat {
    version: String,
    #[serde(default)]
    books: Vec<LocalRecord>,
}

impl JsonFileLocalStore {
    /// Open (or create) a library file
    ///
    /// 1. Load the main file
    /// 2. If it is corrupted, load the backup and restore the main file from it
    /// 3. If both fail, start empty
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create library directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let books = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            books: Arc::new(RwLock::new(books)),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<BookId, LocalRecord>, Error> {
        let err = match Self::load(path).await {
            Ok(books) => {
                tracing::debug!("Loaded library file: {} books", books.len());
                return Ok(books);
            }
            Err(Error::Json(e)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "Library file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with an empty library.");
            return Ok(BTreeMap::new());
        }

        match Self::load(&backup_path).await {
            Ok(books) => {
                tracing::info!("Recovered library from backup: {} books", books.len());
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore library file from backup: {}", e);
                }
                Ok(books)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with an empty library.",
                    backup_err
                );
                Ok(BTreeMap::new())
            }
        }
    }

    async fn load(path: &Path) -> Result<BTreeMap<BookId, LocalRecord>, Error> {
        if !path.exists() {
            tracing::debug!("Library file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::local_store(format!(
                "Failed to read library file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: LibraryFileFormat = serde_json::from_str(&content)?;

        if file.version != LIBRARY_FILE_VERSION {
            tracing::warn!(
                "Library file version mismatch: expected {}, got {}. Attempting to load anyway.",
                LIBRARY_FILE_VERSION,
                file.version
            );
        }

        Ok(file.books.into_iter().map(|b| (b.book_id, b)).collect())
    }

    async fn persist(&self, books: &BTreeMap<BookId, LocalRecord>) -> Result<(), Error> {
        let file = LibraryFileFormat {
            version: LIBRARY_FILE_VERSION.to_string(),
            books: books.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut f = fs::File::create(&temp_path).await.map_err(|e| {
                Error::local_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            f.write_all(json.as_bytes()).await.map_err(|e| {
                Error::local_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            f.flush().await.map_err(|e| {
                Error::local_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::local_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Library written to {}", self.path.display());
        Ok(())
    }

    /// Insert or replace a record wholesale and persist
    pub async fn insert(&self, record: LocalRecord) -> Result<(), Error> {
        let mut guard = self.books.write().await;
        let mut next = guard.clone();
        next.insert(record.book_id, record);
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }

    /// Path of the library file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl LocalStore for JsonFileLocalStore {
    async fn list_books(&self) -> Result<Vec<BookId>, Error> {
        Ok(self.books.read().await.keys().copied().collect())
    }

    async fn resolve(&self, uuid: &str) -> Result<Option<BookId>, Error> {
        let guard = self.books.read().await;
        Ok(guard.values().find(|b| b.uuid == uuid).map(|b| b.book_id))
    }

    async fn read(&self, id: BookId) -> Result<LocalRecord, Error> {
        let guard = self.books.read().await;
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
        let mut guard = self.books.write().await;
        let mut merged = guard
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::record_not_found(record.uuid.clone()))?;
        super::merge_record(&mut merged, record, options);

        // Memory only changes once the file holds the merged record
        let mut next = guard.clone();
        next.insert(id, merged);
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        let guard = self.books.read().await;
        self.persist(&guard).await
    }
}
