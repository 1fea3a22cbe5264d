//! Field reconciliation
//!
//! [`ReconciliationEngine::reconcile`] is a pure function: it reads one
//! linked [`LocalRecord`] and its [`RemoteSources`], and returns the minimal
//! [`UpdateSet`] plus a change log. Writing the result back is the caller's
//! job.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use crate::config::ColumnSelection;
use crate::mapping::{FieldKey, FieldMappingTable, RemoteSources};
use crate::model::{FieldValue, LocalRecord};

/// New values for local columns, keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSet(BTreeMap<String, FieldValue>);

impl UpdateSet {
    /// Whether nothing needs writing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Pending value for a column
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.0.get(column)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    /// Copy every pending value into the record's columns
    pub fn apply_to(&self, record: &mut LocalRecord) {
        for (column, value) in &self.0 {
            record.fields.insert(column.clone(), value.clone());
        }
    }
}

/// One changed column, for the run report
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub key: FieldKey,
    pub label: &'static str,
    pub column: String,
    pub old: Option<FieldValue>,
    pub new: FieldValue,
}

/// Renders as `label: old >> new`, with `-` for a previously empty column
impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old {
            Some(old) => write!(f, "{}: {} >> {}", self.label, old, self.new),
            None => write!(f, "{}: - >> {}", self.label, self.new),
        }
    }
}

/// Result of reconciling one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub updates: UpdateSet,
    /// Changes in table order
    pub changes: Vec<FieldChange>,
}

impl Reconciliation {
    /// Whether the record is already up to date
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Change log lines
    pub fn change_lines(&self) -> Vec<String> {
        self.changes.iter().map(ToString::to_string).collect()
    }
}

/// Computes per-record updates from the mapping table and column selection
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    table: FieldMappingTable,
    columns: ColumnSelection,
}

impl ReconciliationEngine {
    pub fn new(table: FieldMappingTable, columns: ColumnSelection) -> Self {
        Self { table, columns }
    }

    /// Column selection in use
    pub fn columns(&self) -> &ColumnSelection {
        &self.columns
    }

    /// Diff one record against its remote sources
    ///
    /// Only fields with a configured destination column are considered. A
    /// field enters the update set when its extracted value is present and
    /// differs from the column's current value.
    pub fn reconcile(&self, record: &LocalRecord, sources: &RemoteSources<'_>) -> Reconciliation {
        let mut result = Reconciliation::default();

        for mapping in self.table.iter() {
            let Some(column) = self.columns.column_for(mapping.key) else {
                continue;
            };
            let Some(new) = mapping.extract(sources) else {
                continue;
            };

            let old = record.field(column);
            if old == Some(&new) {
                continue;
            }

            result.updates.0.insert(column.to_string(), new.clone());
            result.changes.push(FieldChange {
                key: mapping.key,
                label: mapping.label,
                column: column.to_string(),
                old: old.cloned(),
                new,
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldMapping, LocalDatatype, SourceCategory};
    use crate::model::{BookId, ProgressRecord, RemoteItem};
    use serde_json::{Value, json};

    static FRACTION_TABLE: &[FieldMapping] = &[FieldMapping {
        key: FieldKey::ProgressFloat,
        label: "Progress Fraction",
        description: "Raw progress fraction",
        datatype: LocalDatatype::Float,
        default_column: "#fraction",
        source: SourceCategory::Progress,
        path: &["fraction"],
        transform: None,
        progress_default: None,
    }];

    fn item() -> RemoteItem {
        RemoteItem::from_value(json!({
            "id": "li_1",
            "size": 1_073_741_824u64,
            "media": {
                "duration": 45296.0,
                "metadata": {"title": "Dune", "narratorName": "Scott Brick"}
            }
        }))
        .unwrap()
    }

    fn record() -> LocalRecord {
        LocalRecord::new(BookId(1), "uuid-1", "Dune").with_identifier("audiobookshelf_id", "li_1")
    }

    fn fraction_engine() -> ReconciliationEngine {
        ReconciliationEngine::new(
            FieldMappingTable::from_static(FRACTION_TABLE),
            ColumnSelection::new().with(FieldKey::ProgressFloat, "progress_column"),
        )
    }

    #[test]
    fn progress_fraction_updates_only_when_different() {
        let item = item();
        let progress = ProgressRecord::from_value(json!({"libraryItemId": "li_1", "fraction": 0.42})).unwrap();
        let profile = Value::Null;
        let sources = RemoteSources { item: &item, progress: Some(&progress), profile: &profile };
        let engine = fraction_engine();

        let stale = record().with_field("progress_column", 0.3);
        let result = engine.reconcile(&stale, &sources);
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates.get("progress_column"), Some(&FieldValue::Float(0.42)));
        assert_eq!(result.change_lines(), vec!["Progress Fraction: 0.3 >> 0.42".to_string()]);

        let current = record().with_field("progress_column", 0.42);
        assert!(engine.reconcile(&current, &sources).is_empty());
    }

    #[test]
    fn missing_intermediate_key_is_excluded() {
        let item = item();
        let profile = Value::Null;
        let sources = RemoteSources { item: &item, progress: None, profile: &profile };
        let engine = ReconciliationEngine::new(
            FieldMappingTable::standard(),
            ColumnSelection::new()
                .with(FieldKey::Publisher, "#abs_publisher")
                .with(FieldKey::ChapterCount, "#abs_chapters"),
        );

        assert!(engine.reconcile(&record(), &sources).is_empty());
    }

    #[test]
    fn unconfigured_fields_are_skipped() {
        let item = item();
        let profile = Value::Null;
        let sources = RemoteSources { item: &item, progress: None, profile: &profile };
        let engine = ReconciliationEngine::new(
            FieldMappingTable::standard(),
            ColumnSelection::new().with(FieldKey::Narrator, "#abs_narrator").with(FieldKey::Size, ""),
        );

        let result = engine.reconcile(&record(), &sources);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].to_string(), "Audiobook Narrator: - >> Scott Brick");
    }

    #[test]
    fn second_pass_is_idempotent() {
        let item = item();
        let progress = ProgressRecord::from_value(json!({
            "libraryItemId": "li_1",
            "progress": 0.5,
            "isFinished": false,
            "lastUpdate": 1_700_000_000_000i64
        }))
        .unwrap();
        let profile = json!({"bookmarks": [{"title": "Intro", "time": 12}]});
        let sources = RemoteSources { item: &item, progress: Some(&progress), profile: &profile };

        let mut columns = ColumnSelection::new();
        for key in FieldKey::ALL {
            columns = columns.with(key, format!("#{}", key));
        }
        let engine = ReconciliationEngine::new(FieldMappingTable::standard(), columns);

        let mut local = record();
        let first = engine.reconcile(&local, &sources);
        assert!(!first.is_empty());
        first.updates.apply_to(&mut local);

        let second = engine.reconcile(&local, &sources);
        assert!(second.is_empty(), "unexpected changes: {:?}", second.change_lines());
    }

    #[test]
    fn changes_follow_table_order() {
        let item = item();
        let profile = Value::Null;
        let sources = RemoteSources { item: &item, progress: None, profile: &profile };
        let engine = ReconciliationEngine::new(
            FieldMappingTable::standard(),
            ColumnSelection::new()
                .with(FieldKey::Narrator, "#a")
                .with(FieldKey::Duration, "#b")
                .with(FieldKey::Size, "#c"),
        );

        let keys: Vec<FieldKey> = engine
            .reconcile(&record(), &sources)
            .changes
            .iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, vec![FieldKey::Size, FieldKey::Duration, FieldKey::Narrator]);
    }
}
