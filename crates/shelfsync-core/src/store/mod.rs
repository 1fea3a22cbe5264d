// # Local Store Implementations
//
// This module provides implementations of the LocalStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::JsonFileLocalStore;
pub use memory::MemoryLocalStore;

use crate::model::LocalRecord;
use crate::traits::WriteOptions;

/// Merge an incoming record into the stored one according to `options`
///
/// The stored `book_id` and `uuid` always win.
pub(crate) fn merge_record(stored: &mut LocalRecord, incoming: &LocalRecord, options: WriteOptions) {
    if !options.preserve_title {
        stored.title = incoming.title.clone();
    }
    if !options.preserve_authors {
        stored.authors = incoming.authors.clone();
    }
    stored.identifiers = incoming.identifiers.clone();
    stored.fields = incoming.fields.clone();
}
