use std::fmt;

use crate::Error;
use crate::index::RemoteCatalogIndex;
use crate::model::{LocalRecord, RemoteItem};

/// Identifier that produced a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    Isbn,
    Asin,
}

impl fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedBy::Isbn => f.write_str("isbn"),
            MatchedBy::Asin => f.write_str("asin"),
        }
    }
}

/// An identifier shared by more than one remote item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    pub matched_by: MatchedBy,
    pub value: String,
    pub candidates: usize,
}

impl From<&Ambiguity> for Error {
    fn from(a: &Ambiguity) -> Self {
        Error::AmbiguousMatch {
            identifier: format!("{}:{}", a.matched_by, a.value),
            candidates: a.candidates,
        }
    }
}

/// Outcome of testing one record
#[derive(Debug, Clone, PartialEq)]
pub enum LinkDecision<'a> {
    /// The record already carries a remote id and was not considered
    AlreadyLinked,
    /// Exactly one remote item shares the identifier
    Linked {
        item: &'a RemoteItem,
        matched_by: MatchedBy,
    },
    /// Neither identifier produced a unique match
    NoUniqueMatch { ambiguities: Vec<Ambiguity> },
}

/// Links records whose ISBN, or failing that ASIN, matches exactly one item
#[derive(Debug, Clone, Copy)]
pub struct AutoLinker<'a> {
    index: &'a RemoteCatalogIndex,
}

impl<'a> AutoLinker<'a> {
    pub fn new(index: &'a RemoteCatalogIndex) -> Self {
        Self { index }
    }

    /// Decide without touching the record
    pub fn decide(&self, record: &LocalRecord) -> LinkDecision<'a> {
        if record.remote_id().is_some() {
            return LinkDecision::AlreadyLinked;
        }

        let mut ambiguities = Vec::new();
        let attempts = [
            (MatchedBy::Isbn, record.isbn()),
            (MatchedBy::Asin, record.asin()),
        ];

        for (matched_by, value) in attempts {
            let Some(value) = value else { continue };
            let matches = match matched_by {
                MatchedBy::Isbn => self.index.by_isbn(value),
                MatchedBy::Asin => self.index.by_asin(value),
            };
            match matches.as_slice() {
                [item] => {
                    return LinkDecision::Linked {
                        item: *item,
                        matched_by,
                    };
                }
                [] => {}
                many => ambiguities.push(Ambiguity {
                    matched_by,
                    value: value.to_string(),
                    candidates: many.len(),
                }),
            }
        }

        LinkDecision::NoUniqueMatch { ambiguities }
    }

    /// Decide and, on a unique match, store the remote id in the record
    pub fn link(&self, record: &mut LocalRecord) -> LinkDecision<'a> {
        let decision = self.decide(record);
        if let LinkDecision::Linked { item, .. } = &decision {
            record.set_remote_id(item.id());
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookId, REMOTE_ID_KEY};
    use serde_json::json;

    fn index() -> RemoteCatalogIndex {
        RemoteCatalogIndex::from_payload(&json!({"results": [
            {"id": "li_1", "media": {"metadata": {"title": "Dune", "isbn": "123", "asin": "B001"}}},
            {"id": "li_2", "media": {"metadata": {"title": "Emma", "isbn": "456"}}},
            {"id": "li_3", "media": {"metadata": {"title": "Emma (Unabridged)", "isbn": "456", "asin": "B003"}}},
        ]}))
    }

    fn book() -> LocalRecord {
        LocalRecord::new(BookId(1), "uuid-1", "Local")
    }

    #[test]
    fn unique_isbn_links() {
        let index = index();
        let mut record = book().with_identifier("isbn", "123");

        let decision = AutoLinker::new(&index).link(&mut record);
        assert!(matches!(decision, LinkDecision::Linked { matched_by: MatchedBy::Isbn, item } if item.id() == "li_1"));
        assert_eq!(record.remote_id(), Some("li_1"));
    }

    #[test]
    fn shared_isbn_leaves_record_unlinked() {
        let index = index();
        let mut record = book().with_identifier("isbn", "456");

        let decision = AutoLinker::new(&index).link(&mut record);
        let LinkDecision::NoUniqueMatch { ambiguities } = decision else {
            panic!("expected no unique match, got {:?}", decision);
        };
        assert_eq!(ambiguities.len(), 1);
        assert_eq!(
            Error::from(&ambiguities[0]).to_string(),
            "Ambiguous match for isbn:456: 2 candidates"
        );
        assert_eq!(record.remote_id(), None);
    }

    #[test]
    fn asin_is_fallback_after_ambiguous_isbn() {
        let index = index();
        let record = book().with_identifier("isbn", "456").with_identifier("asin", "B003");

        let decision = AutoLinker::new(&index).decide(&record);
        assert!(matches!(decision, LinkDecision::Linked { matched_by: MatchedBy::Asin, item } if item.id() == "li_3"));
    }

    #[test]
    fn isbn_wins_over_asin() {
        let index = index();
        // ASIN points at li_3, ISBN at li_1: ISBN is tried first
        let record = book().with_identifier("isbn", "123").with_identifier("asin", "B003");

        let decision = AutoLinker::new(&index).decide(&record);
        assert!(matches!(decision, LinkDecision::Linked { item, .. } if item.id() == "li_1"));
    }

    #[test]
    fn already_linked_records_are_untouched() {
        let index = index();
        let mut record = book()
            .with_identifier("isbn", "123")
            .with_identifier(REMOTE_ID_KEY, "li_9");

        assert_eq!(AutoLinker::new(&index).link(&mut record), LinkDecision::AlreadyLinked);
        assert_eq!(record.remote_id(), Some("li_9"));
    }

    #[test]
    fn no_identifiers_is_plain_non_match() {
        let index = index();
        let decision = AutoLinker::new(&index).decide(&book());
        assert_eq!(decision, LinkDecision::NoUniqueMatch { ambiguities: vec![] });
    }
}
