//! Data model shared by the matching and reconciliation components
//!
//! - [`LocalRecord`]: one bibliographic entry in the local store
//! - [`FieldValue`]: the closed value domain of syncable local columns
//! - [`RemoteItem`]: one library entry fetched from the remote catalog
//! - [`ProgressRecord`]: per-user consumption state for one remote item

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier key under which a linked record stores its remote item id
pub const REMOTE_ID_KEY: &str = "audiobookshelf_id";

/// Identifier key for the local ISBN
pub const ISBN_KEY: &str = "isbn";

/// Identifier key for the local ASIN
pub const ASIN_KEY: &str = "asin";

/// Numeric handle the local store uses for a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub u64);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value stored in a syncable local column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::DateTime(v)
    }
}

/// A bibliographic record in the local store
///
/// Title and authors are part of the schema so that matching can read them,
/// but reconciliation never writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Store handle
    pub book_id: BookId,
    /// Stable identifier used to re-resolve the record before writes
    pub uuid: String,
    /// Book title
    #[serde(default)]
    pub title: String,
    /// Author names
    #[serde(default)]
    pub authors: Vec<String>,
    /// Free-form identifier map (isbn, asin, audiobookshelf_id, ...)
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    /// Syncable columns keyed by local column name
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl LocalRecord {
    /// Create a record with no authors, identifiers or columns
    pub fn new(book_id: BookId, uuid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            book_id,
            uuid: uuid.into(),
            title: title.into(),
            authors: Vec::new(),
            identifiers: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Add an author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    /// Set an identifier
    pub fn with_identifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(key.into(), value.into());
        self
    }

    /// Set a column value
    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Title used in reports, falling back to the store handle
    pub fn display_title(&self) -> String {
        if self.title.is_empty() {
            format!("Book {}", self.book_id)
        } else {
            self.title.clone()
        }
    }

    /// The linked remote item id, if any
    pub fn remote_id(&self) -> Option<&str> {
        self.identifier(REMOTE_ID_KEY)
    }

    /// Record the link to a remote item
    pub fn set_remote_id(&mut self, remote_id: impl Into<String>) {
        self.identifiers.insert(REMOTE_ID_KEY.to_string(), remote_id.into());
    }

    /// Local ISBN identifier
    pub fn isbn(&self) -> Option<&str> {
        self.identifier(ISBN_KEY)
    }

    /// Local ASIN identifier
    pub fn asin(&self) -> Option<&str> {
        self.identifier(ASIN_KEY)
    }

    /// Non-empty identifier value by key
    pub fn identifier(&self, key: &str) -> Option<&str> {
        self.identifiers
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Current value of a local column
    pub fn field(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }
}

/// Traverse `path` through nested JSON objects
///
/// Returns `None` as soon as a key is missing, an intermediate value is not
/// an object, or the final value is JSON null. An empty path yields `value`.
pub fn lookup_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    if current.is_null() { None } else { Some(current) }
}

fn non_empty_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup_path(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// A library item from the remote catalog
///
/// The raw payload is kept intact so that field mappings can reach arbitrary
/// media metadata; typed accessors cover what matching needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteItem {
    raw: Value,
}

impl RemoteItem {
    /// Wrap a raw catalog entry. Only objects carrying a non-empty string
    /// `id` are accepted.
    pub fn from_value(raw: Value) -> Option<Self> {
        non_empty_str(&raw, &["id"])?;
        Some(Self { raw })
    }

    /// Remote identifier
    pub fn id(&self) -> &str {
        non_empty_str(&self.raw, &["id"]).unwrap_or_default()
    }

    /// `media.metadata.title`, empty when absent
    pub fn title(&self) -> &str {
        non_empty_str(&self.raw, &["media", "metadata", "title"]).unwrap_or_default()
    }

    /// `media.metadata.authorName`, empty when absent
    pub fn author_name(&self) -> &str {
        non_empty_str(&self.raw, &["media", "metadata", "authorName"]).unwrap_or_default()
    }

    /// `media.metadata.isbn`
    pub fn isbn(&self) -> Option<&str> {
        non_empty_str(&self.raw, &["media", "metadata", "isbn"])
    }

    /// `media.metadata.asin`
    pub fn asin(&self) -> Option<&str> {
        non_empty_str(&self.raw, &["media", "metadata", "asin"])
    }

    /// The untouched catalog payload
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Per-user progress for one remote item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressRecord {
    raw: Value,
}

impl ProgressRecord {
    /// Wrap a raw progress entry. Only objects carrying a non-empty
    /// `libraryItemId` are accepted.
    pub fn from_value(raw: Value) -> Option<Self> {
        non_empty_str(&raw, &["libraryItemId"])?;
        Some(Self { raw })
    }

    /// The remote item this progress refers to
    pub fn library_item_id(&self) -> &str {
        non_empty_str(&self.raw, &["libraryItemId"]).unwrap_or_default()
    }

    /// The untouched progress payload
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}
