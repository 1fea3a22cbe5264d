//! Declarative field-mapping table
//!
//! Each [`FieldMapping`] says where a syncable local column takes its value
//! from: which remote source ([`SourceCategory`]), which key path inside it,
//! and which [`Transform`] turns the raw JSON into a [`FieldValue`].
//!
//! The table is static data. Which entries are active, and which local
//! column each one writes, is decided by the
//! [`ColumnSelection`](crate::config::ColumnSelection) in the configuration.

use crate::model::{FieldValue, ProgressRecord, RemoteItem, lookup_path};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Syncable fields known to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Size,
    Duration,
    Subtitle,
    Narrator,
    Publisher,
    Abridged,
    FileCount,
    ChapterCount,
    ProgressFloat,
    ProgressInt,
    ProgressTime,
    Started,
    Finished,
    LastRead,
    BeginDate,
    FinishDate,
    Bookmarks,
}

impl FieldKey {
    /// Every key, in table order
    pub const ALL: [FieldKey; 17] = [
        FieldKey::Size,
        FieldKey::Duration,
        FieldKey::Subtitle,
        FieldKey::Narrator,
        FieldKey::Publisher,
        FieldKey::Abridged,
        FieldKey::FileCount,
        FieldKey::ChapterCount,
        FieldKey::ProgressFloat,
        FieldKey::ProgressInt,
        FieldKey::ProgressTime,
        FieldKey::Started,
        FieldKey::Finished,
        FieldKey::LastRead,
        FieldKey::BeginDate,
        FieldKey::FinishDate,
        FieldKey::Bookmarks,
    ];

    /// Configuration name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Size => "size",
            FieldKey::Duration => "duration",
            FieldKey::Subtitle => "subtitle",
            FieldKey::Narrator => "narrator",
            FieldKey::Publisher => "publisher",
            FieldKey::Abridged => "abridged",
            FieldKey::FileCount => "file_count",
            FieldKey::ChapterCount => "chapter_count",
            FieldKey::ProgressFloat => "progress_float",
            FieldKey::ProgressInt => "progress_int",
            FieldKey::ProgressTime => "progress_time",
            FieldKey::Started => "started",
            FieldKey::Finished => "finished",
            FieldKey::LastRead => "last_read",
            FieldKey::BeginDate => "begin_date",
            FieldKey::FinishDate => "finish_date",
            FieldKey::Bookmarks => "bookmarks",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| crate::Error::config(format!("Unknown field: {}", s)))
    }
}

/// Which fetched payload a mapping reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCategory {
    /// The progress record for the linked item (`mediaProgress` entry)
    Progress,
    /// The linked library item itself
    Catalog,
    /// The whole user-profile payload
    UserProfile,
}

/// Datatype of the local column a mapping expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalDatatype {
    Text,
    Comments,
    Bool,
    Int,
    Float,
    DateTime,
}

/// Pure value transforms applied to a non-null extracted value
///
/// A transform returns `None` when the input has the wrong shape, which
/// suppresses the field for that record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Bytes to whole megabytes with thousands separators ("1,234 MB")
    Megabytes,
    /// Seconds to "H:MM"
    HoursMinutes,
    /// JSON truthiness
    Truthy,
    /// Fraction to percentage
    Percent,
    /// Fraction to whole percentage, ties to even
    PercentRounded,
    /// Epoch milliseconds to a UTC timestamp
    EpochMillis,
    /// Bookmark list to "title at time" lines
    Bookmarks,
}

impl Transform {
    /// Apply the transform
    pub fn apply(&self, value: &Value) -> Option<FieldValue> {
        match self {
            Transform::Megabytes => {
                let mb = (as_number(value)? / (1024.0 * 1024.0)).trunc() as i64;
                Some(FieldValue::Text(format!("{} MB", group_thousands(mb))))
            }
            Transform::HoursMinutes => as_number(value).map(hours_minutes),
            Transform::Truthy => Some(FieldValue::Bool(is_truthy(value))),
            Transform::Percent => Some(FieldValue::Float(as_number(value)? * 100.0)),
            Transform::PercentRounded => {
                Some(FieldValue::Int((as_number(value)? * 100.0).round_ties_even() as i64))
            }
            Transform::EpochMillis => {
                let secs = (as_number(value)? / 1000.0).trunc() as i64;
                DateTime::from_timestamp(secs, 0).map(FieldValue::DateTime)
            }
            Transform::Bookmarks => Some(FieldValue::Text(format_bookmarks(value))),
        }
    }
}

/// One entry of the field-mapping table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub key: FieldKey,
    /// Human-readable label used in change logs
    pub label: &'static str,
    /// Longer description for column creation
    pub description: &'static str,
    pub datatype: LocalDatatype,
    /// Suggested local column name
    pub default_column: &'static str,
    pub source: SourceCategory,
    /// Keys to traverse inside the source object
    pub path: &'static [&'static str],
    pub transform: Option<Transform>,
    /// Value used when extraction yields null but a progress record exists
    pub progress_default: Option<bool>,
}

/// The payloads one linked record is reconciled against
#[derive(Debug, Clone, Copy)]
pub struct RemoteSources<'a> {
    pub item: &'a RemoteItem,
    pub progress: Option<&'a ProgressRecord>,
    pub profile: &'a Value,
}

impl FieldMapping {
    /// Compute this field's value from the remote sources
    ///
    /// `None` means "no value": the path did not resolve, or the transform
    /// rejected the input. Neither is an error.
    pub fn extract(&self, sources: &RemoteSources<'_>) -> Option<FieldValue> {
        let no_progress = Value::Object(Map::new());
        let root = match self.source {
            SourceCategory::Progress => sources.progress.map_or(&no_progress, |p| p.raw()),
            SourceCategory::Catalog => sources.item.raw(),
            SourceCategory::UserProfile => sources.profile,
        };

        let Some(raw) = lookup_path(root, self.path) else {
            return match (self.progress_default, sources.progress) {
                (Some(default), Some(_)) => Some(FieldValue::Bool(default)),
                _ => None,
            };
        };

        match self.transform {
            Some(transform) => transform.apply(raw),
            None => plain_value(raw),
        }
    }
}

/// The set of field mappings a run reconciles with
#[derive(Debug, Clone, Copy)]
pub struct FieldMappingTable {
    entries: &'static [FieldMapping],
}

impl FieldMappingTable {
    /// The built-in Audiobookshelf table
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_MAPPINGS,
        }
    }

    /// A table over caller-provided entries
    pub fn from_static(entries: &'static [FieldMapping]) -> Self {
        Self { entries }
    }

    /// Entries in table order
    pub fn iter(&self) -> std::slice::Iter<'static, FieldMapping> {
        self.entries.iter()
    }

    /// Entry for a key
    pub fn get(&self, key: FieldKey) -> Option<&'static FieldMapping> {
        self.entries.iter().find(|m| m.key == key)
    }
}

impl Default for FieldMappingTable {
    fn default() -> Self {
        Self::standard()
    }
}

static STANDARD_MAPPINGS: &[FieldMapping] = &[
    FieldMapping {
        key: FieldKey::Size,
        label: "Audiobook Size",
        description: "Size of the audiobook in MB",
        datatype: LocalDatatype::Text,
        default_column: "#abs_size",
        source: SourceCategory::Catalog,
        path: &["size"],
        transform: Some(Transform::Megabytes),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::Duration,
        label: "Audiobook Duration",
        description: "Duration of the audiobook formatted (Hrs:Min)",
        datatype: LocalDatatype::Text,
        default_column: "#abs_duration",
        source: SourceCategory::Catalog,
        path: &["media", "duration"],
        transform: Some(Transform::HoursMinutes),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::Subtitle,
        label: "Audiobook Subtitle",
        description: "Subtitle of the audio/book",
        datatype: LocalDatatype::Text,
        default_column: "#abs_subtitle",
        source: SourceCategory::Catalog,
        path: &["media", "metadata", "subtitle"],
        transform: None,
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::Narrator,
        label: "Audiobook Narrator",
        description: "Narrator name(s)",
        datatype: LocalDatatype::Text,
        default_column: "#abs_narrator",
        source: SourceCategory::Catalog,
        path: &["media", "metadata", "narratorName"],
        transform: None,
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::Publisher,
        label: "Audiobook Publisher",
        description: "Publisher of the audiobook",
        datatype: LocalDatatype::Text,
        default_column: "#abs_publisher",
        source: SourceCategory::Catalog,
        path: &["media", "metadata", "publisher"],
        transform: None,
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::Abridged,
        label: "Audiobook Abridged",
        description: "Indicates if the audiobook is abridged",
        datatype: LocalDatatype::Bool,
        default_column: "#abs_abridged",
        source: SourceCategory::Catalog,
        path: &["media", "metadata", "abridged"],
        transform: Some(Transform::Truthy),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::FileCount,
        label: "Audiobook File Count",
        description: "Number of files that comprise the audiobook",
        datatype: LocalDatatype::Int,
        default_column: "#abs_numfiles",
        source: SourceCategory::Catalog,
        path: &["numFiles"],
        transform: None,
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::ChapterCount,
        label: "Audiobook Chapters",
        description: "Number of chapters in the audiobook",
        datatype: LocalDatatype::Int,
        default_column: "#abs_numchapters",
        source: SourceCategory::Catalog,
        path: &["media", "numChapters"],
        transform: None,
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::ProgressFloat,
        label: "Audiobook Precise Progress",
        description: "Progress percentage with decimal precision",
        datatype: LocalDatatype::Float,
        default_column: "#abs_progfloat",
        source: SourceCategory::Progress,
        path: &["progress"],
        transform: Some(Transform::Percent),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::ProgressInt,
        label: "Audiobook Progress",
        description: "Progress percentage as a whole number",
        datatype: LocalDatatype::Int,
        default_column: "#abs_progint",
        source: SourceCategory::Progress,
        path: &["progress"],
        transform: Some(Transform::PercentRounded),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::ProgressTime,
        label: "Audiobook Progress Time",
        description: "Current audiobook progress time formatted as Hrs:Min",
        datatype: LocalDatatype::Text,
        default_column: "#abs_progresstime",
        source: SourceCategory::Progress,
        path: &["currentTime"],
        transform: Some(Transform::HoursMinutes),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::Started,
        label: "Audiobook Started?",
        description: "Indicates if the audiobook has been started",
        datatype: LocalDatatype::Bool,
        default_column: "#abs_started",
        source: SourceCategory::Progress,
        path: &[],
        transform: Some(Transform::Truthy),
        progress_default: Some(true),
    },
    FieldMapping {
        key: FieldKey::Finished,
        label: "Audiobook Finished?",
        description: "Indicates if the audiobook has been finished",
        datatype: LocalDatatype::Bool,
        default_column: "#abs_finished",
        source: SourceCategory::Progress,
        path: &["isFinished"],
        transform: Some(Transform::Truthy),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::LastRead,
        label: "Audiobook Last Read Date",
        description: "The last date the audiobook was read",
        datatype: LocalDatatype::DateTime,
        default_column: "#abs_lastread",
        source: SourceCategory::Progress,
        path: &["lastUpdate"],
        transform: Some(Transform::EpochMillis),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::BeginDate,
        label: "Audiobook Begin Date",
        description: "The date when the audiobook reading began",
        datatype: LocalDatatype::DateTime,
        default_column: "#abs_begindate",
        source: SourceCategory::Progress,
        path: &["startedAt"],
        transform: Some(Transform::EpochMillis),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::FinishDate,
        label: "Audiobook Finish Date",
        description: "The date when the audiobook was finished",
        datatype: LocalDatatype::DateTime,
        default_column: "#abs_finishdate",
        source: SourceCategory::Progress,
        path: &["finishedAt"],
        transform: Some(Transform::EpochMillis),
        progress_default: None,
    },
    FieldMapping {
        key: FieldKey::Bookmarks,
        label: "Audiobook Bookmarks",
        description: "Bookmarks in the format 'title at time'",
        datatype: LocalDatatype::Comments,
        default_column: "#abs_bookmarks",
        source: SourceCategory::UserProfile,
        path: &["bookmarks"],
        transform: Some(Transform::Bookmarks),
        progress_default: None,
    },
];

/// Untransformed JSON to a column value; containers have no column form
fn plain_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(FieldValue::Int)
            .or_else(|| n.as_f64().map(FieldValue::Float)),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Numbers, or strings that parse as numbers
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn hours_minutes(seconds: f64) -> FieldValue {
    let hours = (seconds / 3600.0).floor() as i64;
    let minutes = (seconds.rem_euclid(3600.0) / 60.0).floor() as i64;
    FieldValue::Text(format!("{}:{:02}", hours, minutes))
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_bookmarks(value: &Value) -> String {
    let lines: Vec<String> = value
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(Value::as_object)
                .map(|b| {
                    format!(
                        "{} at {}",
                        display_or(b.get("title"), "No Title"),
                        display_or(b.get("time"), "00:00:00")
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        "No Bookmarks".to_string()
    } else {
        lines.join("\n")
    }
}

// An explicit null reads the same as a missing key
fn display_or(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
