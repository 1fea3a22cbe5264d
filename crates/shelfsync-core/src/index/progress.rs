// # Progress Lookup
//
// Indexes the `mediaProgress` list embedded in the user-profile payload by
// remote item id.

use crate::model::ProgressRecord;
use serde_json::Value;
use std::collections::HashMap;

/// Progress records keyed by remote item id
#[derive(Debug, Clone, Default)]
pub struct ProgressLookup {
    by_item: HashMap<String, ProgressRecord>,
}

impl ProgressLookup {
    /// Build the lookup from a raw user-profile payload
    ///
    /// A missing or non-list `mediaProgress` yields an empty lookup.
    /// Duplicate item ids keep the last record in list order.
    pub fn from_profile(profile: &Value) -> Self {
        let records = profile
            .get("mediaProgress")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|entry| ProgressRecord::from_value(entry.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self::from_records(records)
    }

    /// Build the lookup from parsed records
    pub fn from_records(records: Vec<ProgressRecord>) -> Self {
        let mut by_item = HashMap::with_capacity(records.len());
        for record in records {
            by_item.insert(record.library_item_id().to_string(), record);
        }
        Self { by_item }
    }

    /// Progress for a remote item
    pub fn get(&self, remote_id: &str) -> Option<&ProgressRecord> {
        self.by_item.get(remote_id)
    }

    /// Whether the user has any progress on a remote item
    pub fn contains(&self, remote_id: &str) -> bool {
        self.by_item.contains_key(remote_id)
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    /// Whether no progress was recorded
    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_progress_list_is_empty() {
        assert!(ProgressLookup::from_profile(&json!({"username": "reader"})).is_empty());
        assert!(ProgressLookup::from_profile(&json!({"mediaProgress": null})).is_empty());
    }

    #[test]
    fn later_duplicates_overwrite_earlier() {
        let profile = json!({
            "mediaProgress": [
                {"libraryItemId": "li_1", "progress": 0.1},
                {"libraryItemId": "li_2", "progress": 0.5},
                {"libraryItemId": "li_1", "progress": 0.9},
                {"progress": 0.3}
            ]
        });
        let lookup = ProgressLookup::from_profile(&profile);

        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.get("li_1").unwrap().raw()["progress"], json!(0.9));
        assert!(lookup.contains("li_2"));
        assert!(!lookup.contains("li_3"));
    }
}
