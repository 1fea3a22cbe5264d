// # Remote Catalog Index
//
// Builds exact and secondary-identifier lookups over one catalog fetch.
//
// ## Payload Shapes
//
// The library listing may come back as a pagination envelope
// (`{"results": [...], "total": N, ...}`) or as a bare array. Anything else
// is treated as an empty catalog.

use crate::model::RemoteItem;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Lookup structures over a fetched list of remote items
#[derive(Debug, Clone, Default)]
pub struct RemoteCatalogIndex {
    /// Items in fetch order
    items: Vec<RemoteItem>,
    /// id -> position in `items` (last write wins on duplicate ids)
    by_id: HashMap<String, usize>,
    /// ISBN -> positions in `items`
    by_isbn: HashMap<String, Vec<usize>>,
    /// ASIN -> positions in `items`
    by_asin: HashMap<String, Vec<usize>>,
}

impl RemoteCatalogIndex {
    /// Build the index from a raw library-items payload
    pub fn from_payload(payload: &Value) -> Self {
        let entries: &[Value] = match payload {
            Value::Object(map) => map
                .get("results")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            Value::Array(list) => list.as_slice(),
            _ => &[],
        };

        let mut skipped = 0;
        let items: Vec<RemoteItem> = entries
            .iter()
            .filter_map(|entry| {
                let item = RemoteItem::from_value(entry.clone());
                if item.is_none() {
                    skipped += 1;
                }
                item
            })
            .collect();

        if skipped > 0 {
            debug!("Ignored {} catalog entries without an id", skipped);
        }

        Self::from_items(items)
    }

    /// Build the index from already-parsed items in one pass
    pub fn from_items(items: Vec<RemoteItem>) -> Self {
        let mut by_id = HashMap::with_capacity(items.len());
        let mut by_isbn: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_asin: HashMap<String, Vec<usize>> = HashMap::new();

        for (pos, item) in items.iter().enumerate() {
            by_id.insert(item.id().to_string(), pos);
            if let Some(isbn) = item.isbn() {
                by_isbn.entry(isbn.to_string()).or_default().push(pos);
            }
            if let Some(asin) = item.asin() {
                by_asin.entry(asin.to_string()).or_default().push(pos);
            }
        }

        debug!(
            "Indexed {} remote items ({} distinct ids, {} ISBNs, {} ASINs)",
            items.len(),
            by_id.len(),
            by_isbn.len(),
            by_asin.len()
        );

        Self {
            items,
            by_id,
            by_isbn,
            by_asin,
        }
    }

    /// Exact lookup by remote id
    pub fn get(&self, remote_id: &str) -> Option<&RemoteItem> {
        self.by_id.get(remote_id).map(|&pos| &self.items[pos])
    }

    /// All items sharing an ISBN
    pub fn by_isbn(&self, isbn: &str) -> Vec<&RemoteItem> {
        self.collect(self.by_isbn.get(isbn))
    }

    /// All items sharing an ASIN
    pub fn by_asin(&self, asin: &str) -> Vec<&RemoteItem> {
        self.collect(self.by_asin.get(asin))
    }

    /// Every indexed item in fetch order
    pub fn items(&self) -> &[RemoteItem] {
        &self.items
    }

    /// Number of indexed items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn collect(&self, positions: Option<&Vec<usize>>) -> Vec<&RemoteItem> {
        positions
            .map(|p| p.iter().map(|&pos| &self.items[pos]).collect())
            .unwrap_or_default()
    }
}
